//! Reading and writing the active lesson id in the page's query string.

use url::Url;

/// The first non-empty value of `param`.
pub fn lesson_from_url(url: &Url, param: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Copy of `url` with `param` set to `id`, or removed when `id` is `None` or empty.
/// An existing parameter keeps its place; other parameters keep their order.
pub fn with_lesson(url: &Url, param: &str, id: Option<&str>) -> Url {
    let id = id.filter(|id| !id.is_empty());
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut placed = false;
    for (key, value) in url.query_pairs() {
        if key != param {
            pairs.push((key.into_owned(), value.into_owned()));
            continue;
        }
        if let (Some(id), false) = (id, placed) {
            pairs.push((param.to_string(), id.to_string()));
            placed = true;
        }
    }
    if let (Some(id), false) = (id, placed) {
        pairs.push((param.to_string(), id.to_string()));
    }

    let mut updated = url.clone();
    if pairs.is_empty() {
        updated.set_query(None);
    } else {
        updated.query_pairs_mut().clear().extend_pairs(&pairs);
    }
    updated
}
