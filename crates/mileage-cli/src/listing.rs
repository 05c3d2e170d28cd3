//! Driving infinite lists from the terminal: `--all` paging and the
//! line-per-keystroke search prompt.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use mileage_client::api::QueryParams;
use mileage_client::debounce::Debouncer;
use mileage_client::{ApiError, InfiniteData, InfiniteList};

/// First page, or every page when `all` is set. Each extra page is loaded the
/// way a visible scroll sentinel would load it.
pub async fn load_pages<T, F>(
    list: &InfiniteList<T, F>,
    all: bool,
) -> Result<InfiniteData<T>, ApiError>
where
    T: Clone + Send + Sync + 'static,
    F: QueryParams,
{
    let mut data = list.load().await?;
    while all && data.has_next_page() {
        match list.on_sentinel_visible(true).await? {
            Some(next) => data = next,
            None => break,
        }
    }
    Ok(data)
}

/// Blank input clears the keyword.
pub fn keyword(line: &str) -> Option<String> {
    let trimmed = line.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Read keywords line by line and re-filter the list once input goes quiet.
///
/// Every line replaces the pending keyword; only the last one typed within
/// `delay` reaches the list. End of input flushes whatever is pending.
pub async fn search<T, F, R>(
    input: R,
    list: &mut InfiniteList<T, F>,
    delay: Duration,
    with_keyword: impl Fn(&F, Option<String>) -> F,
    mut render: impl FnMut(&InfiniteData<T>) -> std::io::Result<()>,
) -> anyhow::Result<Result<(), ApiError>>
where
    T: Clone + Send + Sync + 'static,
    F: QueryParams,
    R: AsyncRead + Unpin,
{
    let (mut debouncer, mut settled) = Debouncer::new(delay);
    let mut lines = BufReader::new(input).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                if let Some(line) = line? {
                    debouncer.push(keyword(&line));
                } else {
                    debouncer.flush();
                    break;
                }
            }
            Some(next) = settled.recv() => {
                if let Err(e) = apply(list, &with_keyword, next, &mut render).await? {
                    return Ok(Err(e));
                }
            }
        }
    }

    while let Ok(next) = settled.try_recv() {
        if let Err(e) = apply(list, &with_keyword, next, &mut render).await? {
            return Ok(Err(e));
        }
    }
    Ok(Ok(()))
}

async fn apply<T, F>(
    list: &mut InfiniteList<T, F>,
    with_keyword: &impl Fn(&F, Option<String>) -> F,
    next: Option<String>,
    render: &mut impl FnMut(&InfiniteData<T>) -> std::io::Result<()>,
) -> anyhow::Result<Result<(), ApiError>>
where
    T: Clone + Send + Sync + 'static,
    F: QueryParams,
{
    debug!(keyword = ?next, "Search settled");
    let filters = with_keyword(list.filters(), next);
    match list.set_filters(filters).await {
        Ok(data) => {
            render(&data)?;
            Ok(Ok(()))
        }
        Err(e) => Ok(Err(e)),
    }
}
