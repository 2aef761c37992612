use std::collections::HashSet;

/// Scores a URL's domain for the hybrid refiner's authority boost
/// (`combined * (1 + (authority - 0.5))`, clamped to [0,1]).
///
/// Authority scores and the curated domain lists are configuration
/// defaults, not hardcoded invariants: callers may supply their own list
/// via `SourceAuthority::new`.
pub struct SourceAuthority {
    high_authority: HashSet<String>,
    low_authority_markers: Vec<String>,
}

impl SourceAuthority {
    pub fn new(high_authority: HashSet<String>, low_authority_markers: Vec<String>) -> Self {
        Self {
            high_authority,
            low_authority_markers,
        }
    }

    pub fn get_score(&self, url: &str) -> f32 {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        else {
            return 0.5;
        };

        if self.high_authority.contains(&host) {
            return 1.0;
        }
        if self
            .high_authority
            .iter()
            .any(|d| host.ends_with(&format!(".{}", d)))
        {
            return 0.9;
        }
        if self
            .low_authority_markers
            .iter()
            .any(|m| host.contains(m.as_str()))
        {
            return 0.2;
        }
        0.5
    }
}

impl Default for SourceAuthority {
    fn default() -> Self {
        let high_authority = [
            "wikipedia.org",
            "github.com",
            "stackoverflow.com",
            "docs.rs",
            "rust-lang.org",
            "developer.mozilla.org",
            "w3.org",
            "ietf.org",
            "arxiv.org",
            "nature.com",
            "nih.gov",
            "who.int",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let low_authority_markers = [
            "blogspot.",
            "pinterest.",
            "quora.com",
            "medium.com",
            "wordpress.com",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self::new(high_authority, low_authority_markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_authority_domain_scores_one() {
        let auth = SourceAuthority::default();
        assert_eq!(auth.get_score("https://docs.rs/tokio"), 1.0);
    }

    #[test]
    fn subdomain_of_high_authority_scores_point_nine() {
        let auth = SourceAuthority::default();
        assert_eq!(auth.get_score("https://en.wikipedia.org/wiki/Rust"), 0.9);
    }

    #[test]
    fn low_authority_marker_scores_low() {
        let auth = SourceAuthority::default();
        assert_eq!(auth.get_score("https://someone.medium.com/post"), 0.2);
    }

    #[test]
    fn unknown_domain_scores_neutral() {
        let auth = SourceAuthority::default();
        assert_eq!(auth.get_score("https://example.com"), 0.5);
    }
}
