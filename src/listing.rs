//! Paging through the remote dump index.

use crate::api::ExportApi;
use crate::error::Result;
use crate::types::Dump;
use tracing::{debug, warn};

/// Dumps requested per page.
pub const PAGE_SIZE: usize = 50;

/// Lists every dump with a sequence strictly greater than `after`, newest
/// first.
///
/// The provider answers each request with the oldest `page_size` dumps after
/// the cursor, newest first within the page. Each following page is newer
/// than everything fetched so far, so it goes in front. A short page ends the
/// listing. Any page error aborts the whole listing.
pub async fn list_dumps_after<A: ExportApi>(
    api: &A,
    after: u64,
    page_size: usize,
) -> Result<Vec<Dump>> {
    let mut dumps: Vec<Dump> = Vec::new();
    let mut cursor = after;

    loop {
        let mut page = api.list_dumps(cursor, page_size).await?;
        let page_len = page.len();
        debug!(after = cursor, count = page_len, "fetched dump page");

        let newest = page.iter().map(|d| d.sequence).max();
        page.append(&mut dumps);
        dumps = page;

        if page_len < page_size {
            break;
        }
        match newest {
            Some(seq) if seq > cursor => cursor = seq,
            _ => {
                warn!(
                    after = cursor,
                    "dump listing did not advance past cursor, stopping"
                );
                break;
            }
        }
    }

    Ok(dumps)
}

/// Multi-line human description of a dump, as printed by `list`.
pub fn describe_dump(dump: &Dump) -> String {
    fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
        value
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }
    format!(
        "- Dump ID: [ {} ]\n  Sequence: [ {} ]\n  Account ID: [ {} ]\n  Number of Files: [ {} ]\n  Finished: [ {} ]\n  Expires At: [ {} ]\n  Created At: [ {} ]",
        dump.dump_id,
        dump.sequence,
        show(&dump.account_id),
        show(&dump.num_files),
        show(&dump.finished),
        show(&dump.expires),
        show(&dump.created_at),
    )
}
