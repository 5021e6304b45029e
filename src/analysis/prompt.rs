use crate::apis::PaperRecord;

/// Build the analysis prompt for a paper. The section names match the
/// headers the response parser looks for.
pub fn analysis_prompt(paper: &PaperRecord) -> String {
    format!(
        "Analyze the following research paper:

Title: {title}
Authors: {authors}
Abstract: {abstract_text}

Please provide a structured analysis with the following sections:
1. Summary (2-3 sentences)
2. Key Findings (bullet points)
3. Methodology Overview
4. Potential Applications
5. Future Research Directions

Format the response in a clear, structured way.",
        title = paper.title,
        authors = paper.authors.join(", "),
        abstract_text = paper.abstract_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::testing::paper;
    use crate::apis::Source;

    #[test]
    fn test_prompt_embeds_paper() {
        let p = paper(Source::Arxiv, "1", "Sparse Attention");
        let prompt = analysis_prompt(&p);
        assert!(prompt.contains("Title: Sparse Attention\n"));
        assert!(prompt.contains("Authors: Ada Lovelace, Alan Turing\n"));
        assert!(prompt.contains("Abstract: Abstract of Sparse Attention\n"));
        assert_eq!(prompt, analysis_prompt(&p));
    }

    #[test]
    fn test_prompt_section_order() {
        let prompt = analysis_prompt(&paper(Source::Arxiv, "1", "T"));
        let positions: Vec<usize> = [
            "Summary",
            "Key Findings",
            "Methodology",
            "Applications",
            "Future Research Directions",
        ]
        .iter()
        .map(|s| prompt.find(s).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
