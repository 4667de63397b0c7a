//! Minimal `*`-wildcard glob matching for `--filter`, the shape of filter
//! the teacher's extract command applies to dictionary lines (plain string
//! matching there; a `*` glob is what spec.md §6 asks for here).

/// A compiled `*`-wildcard pattern. `*` matches any run of characters
/// (including none); everything else must match literally.
pub struct GlobFilter {
    segments: Vec<String>,
    anchored_start: bool,
    anchored_end: bool,
}

impl GlobFilter {
    pub fn new(pattern: &str) -> GlobFilter {
        GlobFilter {
            segments: pattern.split('*').map(str::to_string).collect(),
            anchored_start: !pattern.starts_with('*'),
            anchored_end: !pattern.ends_with('*'),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let mut rest = candidate;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.is_empty() {
                continue;
            }
            if i == 0 && self.anchored_start {
                if !rest.starts_with(segment.as_str()) {
                    return false;
                }
                rest = &rest[segment.len()..];
                continue;
            }
            if i == self.segments.len() - 1 && self.anchored_end {
                return rest.ends_with(segment.as_str());
            }
            match rest.find(segment.as_str()) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_requires_exact_match() {
        let f = GlobFilter::new("Carla.yack");
        assert!(f.matches("Carla.yack"));
        assert!(!f.matches("Carla.yack2"));
    }

    #[test]
    fn trailing_star_matches_prefix() {
        let f = GlobFilter::new("Carla*");
        assert!(f.matches("Carla.yack"));
        assert!(!f.matches("Ray.yack"));
    }

    #[test]
    fn leading_and_trailing_star_matches_substring() {
        let f = GlobFilter::new("*.yack");
        assert!(f.matches("Carla.yack"));
        assert!(!f.matches("Carla.dink"));
    }

    #[test]
    fn bare_star_matches_everything() {
        let f = GlobFilter::new("*");
        assert!(f.matches(""));
        assert!(f.matches("anything.bin"));
    }
}
