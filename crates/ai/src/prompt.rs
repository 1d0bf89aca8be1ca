// Request text for one cell

use promptgrid_config::settings::{ResponseFormat, ResponseStructure};

fn format_instruction(format: ResponseFormat) -> &'static str {
    match format {
        ResponseFormat::Text => "- Reply in plain text",
        ResponseFormat::Json => "- Reply with valid JSON only",
        ResponseFormat::Html => "- Reply with valid HTML only",
        ResponseFormat::Csv => "- Reply in CSV format (comma-separated values)",
    }
}

/// Build the text sent to a provider for one cell: the desired format, the
/// requested sections, the column prompt and the cell value.
pub fn format_prompt(
    prompt: &str,
    input: &str,
    format: ResponseFormat,
    structure: &ResponseStructure,
) -> String {
    let mut out = String::from("Desired response format:\n");
    out.push_str(format_instruction(format));
    out.push('\n');

    out.push_str("\nResponse structure:\n");
    let sections = [
        (structure.title, "- Include a title"),
        (structure.description, "- Include a description"),
        (structure.keywords, "- Include keywords"),
        (structure.categories, "- Include categories"),
        (structure.summary, "- Include a summary"),
        (structure.analysis, "- Include an analysis"),
    ];
    for (_, line) in sections.iter().filter(|(enabled, _)| *enabled) {
        out.push_str(line);
        out.push('\n');
    }

    let custom: Vec<&str> = structure
        .custom
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !custom.is_empty() {
        out.push_str("\nCustom fields to include:\n");
        for field in custom {
            out.push_str("- ");
            out.push_str(field);
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(prompt);
    out.push_str("\n\nInput: ");
    out.push_str(input);
    out.push_str("\n\nResponse:");
    out
}
