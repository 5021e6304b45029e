use serde::{Deserialize, Serialize};

/// Structured analysis extracted from generated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub methodology: String,
    pub applications: Vec<String>,
    pub future_work: Vec<String>,
    /// Set when no section could be recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl AnalysisResult {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    KeyFindings,
    Methodology,
    Applications,
    FutureWork,
}

impl Section {
    /// Match a header line. Only lines containing a colon qualify.
    fn from_header(line: &str) -> Option<Self> {
        if !line.contains(':') {
            return None;
        }
        let lower = line.to_lowercase();
        if lower.contains("summary") {
            Some(Section::Summary)
        } else if lower.contains("key findings") {
            Some(Section::KeyFindings)
        } else if lower.contains("methodology") {
            Some(Section::Methodology)
        } else if lower.contains("applications") {
            Some(Section::Applications)
        } else if lower.contains("future") && lower.contains("research") {
            Some(Section::FutureWork)
        } else {
            None
        }
    }
}

/// Line-oriented state machine over generated text.
struct SectionParser {
    current: Option<Section>,
    lines: Vec<String>,
    saw_header: bool,
    out: AnalysisResult,
}

impl SectionParser {
    fn new() -> Self {
        Self {
            current: None,
            lines: Vec::new(),
            saw_header: false,
            out: AnalysisResult::default(),
        }
    }

    fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(section) = Section::from_header(line) {
            self.current = Some(section);
            self.lines.clear();
            self.saw_header = true;
            return;
        }
        let Some(section) = self.current else {
            return;
        };
        let content = line.strip_prefix("- ").unwrap_or(line);
        self.lines.push(content.to_string());
        match section {
            Section::Summary => self.out.summary = self.lines.join(" "),
            Section::Methodology => self.out.methodology = self.lines.join(" "),
            Section::KeyFindings => self.out.key_findings = self.lines.clone(),
            Section::Applications => self.out.applications = self.lines.clone(),
            Section::FutureWork => self.out.future_work = self.lines.clone(),
        }
    }

    fn finish(self, raw: &str) -> AnalysisResult {
        if self.saw_header || raw.trim().is_empty() {
            return self.out;
        }
        AnalysisResult {
            error: Some("Failed to parse analysis: no recognized sections".to_string()),
            raw_response: Some(raw.to_string()),
            ..AnalysisResult::default()
        }
    }
}

/// Parse generated text into an [`AnalysisResult`]. Never fails.
///
/// Text with no recognizable section header yields empty fields plus an
/// error marker carrying the raw text.
pub fn parse_analysis(text: &str) -> AnalysisResult {
    let mut parser = SectionParser::new();
    for line in text.lines() {
        parser.feed(line);
    }
    parser.finish(text)
}
