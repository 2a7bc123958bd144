//! `[[Title]]` link markers embedded in note content.

/// Extract link targets from `[[Title]]` markers, in first-occurrence order,
/// without duplicates. Empty markers (`[[]]`) are ignored.
pub fn extract_links(content: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else {
            break;
        };
        let target = after[..end].trim();
        if !target.is_empty() && !links.iter().any(|l| l == target) {
            links.push(target.to_string());
        }
        rest = &after[end + 2..];
    }

    links
}

/// The marker another note would contain to link to `title`.
pub fn link_marker(title: &str) -> String {
    format!("[[{title}]]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_in_order() {
        let links = extract_links("See [[Ownership]] and [[Borrowing]], then [[Ownership]] again.");
        assert_eq!(links, vec!["Ownership", "Borrowing"]);
    }

    #[test]
    fn ignores_unterminated_and_empty_markers() {
        assert!(extract_links("no links here").is_empty());
        assert!(extract_links("broken [[marker").is_empty());
        assert_eq!(extract_links("[[]] then [[Real]]"), vec!["Real"]);
    }

    #[test]
    fn link_marker_wraps_title() {
        assert_eq!(link_marker("Rust"), "[[Rust]]");
    }
}
