//! Fixed instruction text folded into assembled prompts.

use lectern_core::ToolResult;

/// Appended to every system prompt.
pub const EQUATION_ADDENDUM: &str = "When writing equations, use LaTeX: wrap inline math in single \
dollar signs ($E = mc^2$) and display math in double dollar signs on their own lines \
($$\\int_0^1 x\\,dx$$). Never use \\( \\) or \\[ \\] delimiters.";

/// Appended to the system prompt when documents are attached.
pub const CITATION_INSTRUCTIONS: &str = "\
When you use information from the provided documents, cite it inline.
Citation rules:
- Cite a document as [n], where n is the number the document is listed under, e.g. [1].
- If the document has page numbers, cite the page as [n, page: p], e.g. [3, page: 12].
- Never place more than 3 citations next to each other.
- End your answer with a \"Relevant Sources\" list, one cited document per line:
  n. [document_name](#)
  n. [document_name, page: p](#)
  Keep the (#) placeholder exactly as written; it is replaced with a link.
- List only documents you actually cited. If you cited nothing, leave out the Relevant Sources list entirely.";

/// Instructions placed inside `<RetrievedDocumentsInstructions>`.
pub const DOCUMENT_INSTRUCTIONS: &str = "The following documents were retrieved from the course \
materials because they may help answer the user's query. Each one starts with its number and \
document name. They may be incomplete or irrelevant; use only what applies and cite what you use.";

/// Placed before the per-tool blocks.
pub const TOOL_INSTRUCTIONS: &str = "The following tools were run for the user's query. Use \
their outputs when they help answer it, and mention when a tool failed.";

/// Returned by [`build_tools_output_results`] for an empty tool list.
pub const NO_TOOLS_USED: &str = "No tools used.";

/// Stands in for tool output delivered as images.
pub const TOOL_IMAGE_NOTE: &str = "Images were generated by this tool and are attached to the user's message.";

/// Wrap packed passages in the retrieved-documents envelope.
pub fn documents_envelope(documents: &str) -> String {
    format!(
        "<RetrievedDocumentsInstructions>\n{DOCUMENT_INSTRUCTIONS}\n</RetrievedDocumentsInstructions>\n\
         <PotentiallyRelevantDocuments>\n{documents}</PotentiallyRelevantDocuments>"
    )
}

/// Wrap the user's text as the final prompt section.
pub fn user_query_section(text: &str) -> String {
    format!("<User Query>\n{text}\n</User Query>")
}

/// Render one tool result.
///
/// `Tool: <name>\nOutput: <text | JSON | image note>`, or
/// `Tool: <name>\n<error>` when the tool failed.
pub fn format_tool_result(tool: &ToolResult) -> String {
    if let Some(error) = &tool.error {
        return format!("Tool: {}\n{}", tool.readable_name, error);
    }

    let output = match &tool.output {
        Some(output) => {
            if let Some(text) = &output.text {
                text.clone()
            } else if output.image_urls.as_ref().is_some_and(|urls| !urls.is_empty()) {
                TOOL_IMAGE_NOTE.to_string()
            } else if let Some(data) = &output.data {
                data.to_string()
            } else {
                "(no output)".to_string()
            }
        }
        None => "(no output)".to_string(),
    };
    format!("Tool: {}\nOutput: {}", tool.readable_name, output)
}

/// The tool section for a message, or [`NO_TOOLS_USED`] when no tool ran.
pub fn build_tools_output_results(tools: &[ToolResult]) -> String {
    if tools.is_empty() {
        return NO_TOOLS_USED.to_string();
    }
    let blocks: Vec<String> = tools.iter().map(format_tool_result).collect();
    format!("{TOOL_INSTRUCTIONS}\n\n{}", blocks.join("\n\n"))
}
