const EXTRACTION_TEMPLATE: &str = include_str!("prompts/extraction.txt");

const DEVLOG_PLACEHOLDER: &str = "{devlog}";

/// Build the instruction prompt for one devlog session
pub fn build_extraction_prompt(devlog: &str) -> String {
    EXTRACTION_TEMPLATE.replacen(DEVLOG_PLACEHOLDER, devlog, 1)
}
