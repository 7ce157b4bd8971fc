use std::collections::HashMap;

/// Named-route reverse lookup.
pub trait UrlResolver: Send + Sync {
    /// Build the path for `name`, substituting `params`. Returns `None` for an
    /// unknown route or a missing parameter.
    fn reverse(&self, name: &str, params: &[(&str, String)]) -> Option<String>;
}

/// Route names mapped to `<param>` patterns.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The public website routes.
    pub fn site() -> Self {
        Self::new()
            .with_route("website-home", "/")
            .with_route("website-stories", "/stories")
            .with_route("patient-story", "/story/<patient_id>/")
            .with_route(
                "patient-story-detail",
                "/story/<patient_id>/story/<story_id>/",
            )
            .with_route("website-faq-categories", "/questions")
            .with_route("website-faq", "/questions/<question_id>")
            .with_route(
                "faq-category-question",
                "/questions/<category_id>/<question_id>",
            )
            .with_route("website-resources", "/resources")
            .with_route("website-resource-article", "/resources/<article_id>")
    }

    pub fn with_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name.into(), pattern.into());
        self
    }
}

impl UrlResolver for RouteTable {
    fn reverse(&self, name: &str, params: &[(&str, String)]) -> Option<String> {
        let pattern = self.routes.get(name)?;
        let mut path = String::with_capacity(pattern.len());
        let mut rest = pattern.as_str();

        while let Some(start) = rest.find('<') {
            path.push_str(&rest[..start]);
            let end = start + rest[start..].find('>')?;
            let key = &rest[start + 1..end];
            let (_, value) = params.iter().find(|(k, _)| *k == key)?;
            path.push_str(value);
            rest = &rest[end + 1..];
        }
        path.push_str(rest);

        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_substitutes_params() {
        let routes = RouteTable::site();
        assert_eq!(
            routes.reverse("website-faq", &[("question_id", "42".to_string())]),
            Some("/questions/42".to_string())
        );
        assert_eq!(
            routes.reverse(
                "patient-story-detail",
                &[("story_id", "3".to_string()), ("patient_id", "8".to_string())]
            ),
            Some("/story/8/story/3/".to_string())
        );
        assert_eq!(routes.reverse("website-home", &[]), Some("/".to_string()));
        assert_eq!(
            routes.reverse(
                "faq-category-question",
                &[("category_id", "2".to_string()), ("question_id", "9".to_string())]
            ),
            Some("/questions/2/9".to_string())
        );
    }

    #[test]
    fn test_reverse_missing_param_or_route() {
        let routes = RouteTable::site();
        assert_eq!(routes.reverse("website-faq", &[]), None);
        assert_eq!(routes.reverse("no-such-route", &[]), None);
    }
}
