//! Partitioning of path lists into requests that fit the backend's URL length limit

/// Maximum URL length accepted by the backend's HTTP server
pub const MAX_URL_LENGTH: usize = 2048;

/// Bytes reserved for the other query parameters and the request headers
pub const URL_RESERVE: usize = 300;

/// Budget for the comma-joined `name` parameter of one request
pub const DEFAULT_URL_BUDGET: usize = MAX_URL_LENGTH - URL_RESERVE;

/// Split `paths` into consecutive chunks whose comma-joined size stays within `budget`
///
/// Each path counts its length plus one separator byte. Chunks are filled greedily in order; a
/// path that does not fit on its own still gets a chunk of its own rather than being dropped.
pub fn chunk_paths<S: AsRef<str>>(paths: &[S], budget: usize) -> Vec<&[S]> {
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut line_length = 0;

    for (i, path) in paths.iter().enumerate() {
        let node_length = path.as_ref().len() + 1;
        if line_length + node_length > budget && i > chunk_start {
            chunks.push(&paths[chunk_start..i]);
            chunk_start = i;
            line_length = 0;
        }
        line_length += node_length;
    }
    if chunk_start < paths.len() {
        chunks.push(&paths[chunk_start..]);
    }

    chunks
}
