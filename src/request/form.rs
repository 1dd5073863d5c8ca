//! `application/x-www-form-urlencoded` encoding.

/// Percent-encodes a form key or value.
///
/// Everything except `A-Z a-z 0-9 - _ . ~` is encoded (so `!'()*` are
/// escaped too) and spaces become `+`.
#[must_use]
pub fn encode_www_form_param(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Joins encoded pairs with `&`.
pub(crate) fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                encode_www_form_param(key),
                encode_www_form_param(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
