//! System prompt and user message construction.

use super::reference::reference_block;
use super::{GenerationRequest, StyleOptions};
use crate::ir::types::TargetLanguage;

/// System prompt for one target language and style.
pub fn system_prompt(language: TargetLanguage, style: &StyleOptions) -> String {
    let mut prompt = format!(
        "You translate visual node graphs into {lang} source code.\n\
         The user message is a JSON document describing one graph. `nodes` are listed in \
         execution-safe order: every input of the form {{\"type\": \"node\", \"record\": \"N3\", \
         \"pin\": \"P2\"}} reads an output of a node listed earlier. Inputs of type \
         `loop_carried` read the variable declared in `metadata.loop_carried`, which holds the \
         value produced on the previous iteration. `exec` links give the control flow. Nodes \
         with category `unsupported` have no known semantics; translate them as a clearly \
         marked placeholder.\n\
         Declare exactly the function given in `metadata.signature`, with the same name and \
         parameters in the same order. Use the names in `metadata.local_variables` for locals.\n\
         When `callees` is present it holds user graphs the main graph calls, each with its own \
         `metadata` and `nodes`. Translate every callee as a separate function; in the JSON \
         response each one is its own entry in `graphs`, named after its `metadata.name`.\n",
        lang = language.display_name()
    );

    prompt.push_str(language_notes(language));
    prompt.push('\n');

    if style.include_comments {
        prompt.push_str("Add brief comments where the control flow is not obvious.\n");
    } else {
        prompt.push_str("Do not add comments.\n");
    }

    if style.json_envelope {
        prompt.push_str(
            "Respond with a single JSON object and nothing else:\n\
             {\"graphs\": [{\"graph_name\": \"<name>\", \"graph_type\": \"<type>\", \
             \"graph_class\": \"<owning class>\", \"code\": {\"graphDeclaration\": \"<declaration>\", \
             \"graphImplementation\": \"<implementation>\", \"implementationNotes\": \"<notes>\"}}]}\n",
        );
    } else {
        prompt.push_str("Respond with the code only, without markdown fences or prose.\n");
    }

    prompt
}

fn language_notes(language: TargetLanguage) -> &'static str {
    match language {
        TargetLanguage::Cpp => {
            "Write modern C++ (C++20). Put the function body in graphImplementation; \
             graphDeclaration may hold a header-style declaration."
        }
        TargetLanguage::Python => "Write idiomatic Python 3 with type hints.",
        TargetLanguage::JavaScript => "Write modern JavaScript (ES2022).",
        TargetLanguage::CSharp => "Write idiomatic C# 12.",
        TargetLanguage::Swift => "Write idiomatic Swift 5.",
        TargetLanguage::Pseudocode => {
            "Write readable pseudocode using braces for blocks and `function name(params)` \
             for the declaration."
        }
    }
}

/// The user message: the IR document as self-describing JSON, preceded by
/// any reference source files.
pub fn user_message(request: &GenerationRequest) -> serde_json::Result<String> {
    let document = request.document.to_json()?;
    Ok(format!(
        "{}{}",
        reference_block(&request.options.reference_files),
        document
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_instructions_follow_style() {
        let style = StyleOptions::default();
        let prompt = system_prompt(TargetLanguage::Python, &style);
        assert!(prompt.contains("Python"));
        assert!(prompt.contains("graphImplementation"));
        assert!(prompt.contains("`callees`"));

        let raw = StyleOptions {
            json_envelope: false,
            ..StyleOptions::default()
        };
        let prompt = system_prompt(TargetLanguage::Cpp, &raw);
        assert!(prompt.contains("code only"));
    }
}
