/// Lowercase ASCII slug: runs of anything that is not a letter or digit
/// collapse into a single `-`, with no leading or trailing separator.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Color"), "color");
        assert_eq!(slugify("Age at transplant"), "age-at-transplant");
        assert_eq!(slugify("  Lung   Function (FEV1) "), "lung-function-fev1");
        assert_eq!(slugify("CF-related diabetes"), "cf-related-diabetes");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(""), "");
    }
}
