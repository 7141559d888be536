use tracing::debug;

use pyindex::hashes::extract_link_hash;
use pyindex::quoting::{ensure_quoted_url, UrlParts};

pub fn quote(url: String) {
    let quoted = ensure_quoted_url(&url);
    debug!("Parsed as {:?}", UrlParts::parse(&url));

    println!("{}", quoted);
    if let Some(hash) = extract_link_hash(&quoted) {
        println!("{}", hash);
    }
}
