//! Pin type compatibility, following the editor's own connection rules.

use crate::parse::types::{ContainerKind, HostPin, PinType};

/// Full shape of a pin's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinShape<'a> {
    pub pin_type: PinType,
    pub sub_type: Option<&'a str>,
    pub container: ContainerKind,
}

impl<'a> From<&'a HostPin> for PinShape<'a> {
    fn from(pin: &'a HostPin) -> Self {
        PinShape {
            pin_type: pin.pin_type,
            sub_type: pin.sub_type.as_deref(),
            container: pin.container,
        }
    }
}

/// Whether two pin categories can be wired together.
pub fn are_types_compatible(a: PinType, b: PinType) -> bool {
    use PinType::*;

    if a == b || a == Wildcard || b == Wildcard {
        return true;
    }

    let pair = |x: PinType, y: PinType| (a == x && b == y) || (a == y && b == x);

    pair(SoftObject, Object)
        || pair(SoftClass, Class)
        || pair(Integer, Float)
        || pair(Integer, Integer64)
        || pair(Float, Double)
        || pair(Real, Float)
        || pair(Real, Double)
        || pair(Vector, Vector4D)
        || pair(Vector2D, Vector)
}

/// Category, container flags and sub-type must all agree. An empty sub-type on
/// either side matches any sub-type.
pub fn are_pins_compatible(a: PinShape<'_>, b: PinShape<'_>) -> bool {
    if a.pin_type == PinType::Wildcard || b.pin_type == PinType::Wildcard {
        return true;
    }
    if !are_types_compatible(a.pin_type, b.pin_type) {
        return false;
    }
    if a.container != b.container {
        return false;
    }
    match (non_empty(a.sub_type), non_empty(b.sub_type)) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(pin_type: PinType) -> PinShape<'static> {
        PinShape {
            pin_type,
            sub_type: None,
            container: ContainerKind::None,
        }
    }

    #[test]
    fn numeric_widening_is_symmetric() {
        assert!(are_types_compatible(PinType::Integer, PinType::Float));
        assert!(are_types_compatible(PinType::Float, PinType::Integer));
        assert!(are_types_compatible(PinType::Real, PinType::Double));
        assert!(!are_types_compatible(PinType::Boolean, PinType::Integer));
    }

    #[test]
    fn soft_references_match_hard_references() {
        assert!(are_types_compatible(PinType::SoftObject, PinType::Object));
        assert!(are_types_compatible(PinType::Class, PinType::SoftClass));
        assert!(!are_types_compatible(PinType::SoftObject, PinType::Class));
    }

    #[test]
    fn wildcard_matches_containers_too() {
        let array = PinShape {
            container: ContainerKind::Array,
            ..shape(PinType::Integer)
        };
        assert!(are_pins_compatible(shape(PinType::Wildcard), array));
    }

    #[test]
    fn container_flags_must_match() {
        let array = PinShape {
            container: ContainerKind::Array,
            ..shape(PinType::Integer)
        };
        assert!(!are_pins_compatible(shape(PinType::Integer), array));
    }

    #[test]
    fn empty_sub_type_matches_any() {
        let actor = PinShape {
            sub_type: Some("Actor"),
            ..shape(PinType::Object)
        };
        let pawn = PinShape {
            sub_type: Some("Pawn"),
            ..shape(PinType::Object)
        };
        let blank = PinShape {
            sub_type: Some(""),
            ..shape(PinType::Object)
        };
        assert!(!are_pins_compatible(actor, pawn));
        assert!(are_pins_compatible(actor, blank));
        assert!(are_pins_compatible(shape(PinType::Object), pawn));
    }
}
