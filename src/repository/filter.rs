use crate::config::FilterSettings;

/// Allow/deny rules deciding which paths are mined.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    allow_prefix: Vec<String>,
    allow_suffix: Vec<String>,
    allow_contents: Vec<String>,
    deny_prefix: Vec<String>,
    deny_suffix: Vec<String>,
    deny_contents: Vec<String>,
}

impl PathFilter {
    pub fn from_settings(settings: &FilterSettings) -> Self {
        Self {
            allow_prefix: settings.allow_prefix.clone(),
            allow_suffix: settings.allow_suffix.clone(),
            allow_contents: settings.allow_contents.clone(),
            deny_prefix: settings.deny_prefix.clone(),
            deny_suffix: settings.deny_suffix.clone(),
            deny_contents: settings.deny_contents.clone(),
        }
    }

    /// Filter that lets every path through.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Whether `path` should be mined.
    ///
    /// `denied` is set whenever a deny rule matches and is never cleared, so
    /// one flag can be threaded through a whole repository.
    pub fn check(&self, path: &str, denied: &mut bool) -> bool {
        let has_allow = !(self.allow_prefix.is_empty()
            && self.allow_suffix.is_empty()
            && self.allow_contents.is_empty());
        let allowed = !has_allow
            || matches(path, &self.allow_prefix, &self.allow_suffix, &self.allow_contents);
        if matches(path, &self.deny_prefix, &self.deny_suffix, &self.deny_contents) {
            *denied = true;
            return false;
        }
        allowed
    }
}

fn matches(path: &str, prefix: &[String], suffix: &[String], contents: &[String]) -> bool {
    prefix.iter().any(|p| path.starts_with(p.as_str()))
        || suffix.iter().any(|s| path.ends_with(s.as_str()))
        || contents.iter().any(|c| path.contains(c.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_take_javascript() {
        let filter = PathFilter::from_settings(&FilterSettings::default());
        let mut denied = false;

        assert!(filter.check("src/index.js", &mut denied));
        assert!(filter.check("package.json", &mut denied));
        assert!(!filter.check("README.md", &mut denied));
        assert!(!denied);
    }

    #[test]
    fn test_deny_wins_and_sticks() {
        let filter = PathFilter::from_settings(&FilterSettings::default());
        let mut denied = false;

        assert!(!filter.check("node_modules/lodash/index.js", &mut denied));
        assert!(denied);
        assert!(!filter.check("lib/node_modules/x.js", &mut denied));
        // later allowed paths leave the flag set
        assert!(filter.check("index.js", &mut denied));
        assert!(denied);
    }

    #[test]
    fn test_no_allow_rules_accepts_everything_not_denied() {
        let filter = PathFilter {
            deny_suffix: vec![".min.js".into()],
            ..PathFilter::default()
        };
        let mut denied = false;

        assert!(filter.check("Makefile", &mut denied));
        assert!(!filter.check("dist/app.min.js", &mut denied));
        assert!(denied);
        assert!(PathFilter::accept_all().check("anything", &mut false));
    }
}
