//! Request URL helpers

/// Entity set addressed by a request URL
///
/// Strips the service base path, a leading `/` and the query string, then
/// takes the first path segment without its key predicate:
/// `/svc/Orders(1)/Items?$top=5` under `/svc/` yields `Orders`.
/// Returns `None` when no segment remains.
#[must_use]
pub fn extract_entity_set(url: &str, base_path: &str) -> Option<String> {
    let path = url.strip_prefix(base_path).unwrap_or(url);
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.split_once('?').map_or(path, |(head, _)| head);

    let segment = path.split('/').next().unwrap_or_default();
    let name = segment.split_once('(').map_or(segment, |(head, _)| head);

    (!name.is_empty()).then(|| name.to_string())
}
