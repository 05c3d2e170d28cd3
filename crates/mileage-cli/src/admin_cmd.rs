//! Operator subcommands: review queue, search, approve / reject, ledgers.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::sync::Arc;

use chrono::NaiveDate;

use mileage_client::api::{AccrualRequestFilters, AdminApi, AdminLedgerFilters, PageRequest};
use mileage_client::debounce::ADMIN_SEARCH_DEBOUNCE;
use mileage_client::guard::Surface;
use mileage_client::pagination::{ADMIN_PAGE_SIZE, LEDGERS_INFINITE_SCOPE, page_loader};
use mileage_client::{
    AccrualStore, ApiClient, ApiError, InfiniteList, QueryCache, ReviewError, ReviewMutations,
};
use mileage_core::{AccrualStatus, EntityId, MileageLedgerEntry};

use crate::context::AppContext;
use crate::fmt::{
    write_ledger_row, write_list, write_page, write_request_detail, write_request_row,
};
use crate::listing::{load_pages, search};
use crate::notifier::TerminalNotifier;

/// Operator subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum AdminAction {
    /// List accrual requests.
    Requests {
        /// Keyword (PNR, ticket number, member name).
        #[arg(short, long)]
        keyword: Option<String>,
        /// Filter by status: pending, inprogress, approved, rejected.
        #[arg(short, long)]
        status: Option<AccrualStatus>,
        /// Filter by submission date (YYYY-MM-DD).
        #[arg(long)]
        submitted_date: Option<NaiveDate>,
        /// Load every page.
        #[arg(short, long, conflicts_with = "page")]
        all: bool,
        /// Show a single numbered page instead of the scrolling list.
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        page: Option<u32>,
    },
    /// Search the review queue interactively, one keyword per line.
    Search {
        /// Filter by status.
        #[arg(short, long)]
        status: Option<AccrualStatus>,
    },
    /// Approve an accrual request.
    Approve {
        /// Accrual request ID.
        id: EntityId,
    },
    /// Reject an accrual request.
    Reject {
        /// Accrual request ID.
        id: EntityId,
        /// Reason shown to the member.
        #[arg(short, long)]
        reason: String,
    },
    /// List miles ledger entries.
    Ledgers {
        /// Member ID.
        #[arg(long)]
        customer_id: Option<EntityId>,
        /// Accrual request ID.
        #[arg(long)]
        accrual_request_id: Option<EntityId>,
        /// Load every page.
        #[arg(short, long)]
        all: bool,
    },
}

/// Execute an operator subcommand.
pub async fn run(action: AdminAction, ctx: &AppContext) -> anyhow::Result<()> {
    let client: Arc<ApiClient> = Arc::new(ctx.api()?);
    let store = AccrualStore::new(client.clone(), ctx.cache_config());

    let result = match action {
        AdminAction::Requests {
            keyword,
            status,
            submitted_date,
            all,
            page,
        } => {
            let filters = AccrualRequestFilters {
                keyword,
                status,
                submitted_date,
            };
            match page {
                Some(page) => requests_page(ctx, &store, &filters, page).await,
                None => requests(ctx, &store, filters, all).await,
            }
        }
        AdminAction::Search { status } => search_requests(ctx, &store, status).await,
        AdminAction::Approve { id } => review(ctx, &store, &id, None).await,
        AdminAction::Reject { id, reason } => review(ctx, &store, &id, Some(&reason)).await,
        AdminAction::Ledgers {
            customer_id,
            accrual_request_id,
            all,
        } => {
            let filters = AdminLedgerFilters {
                customer_id,
                accrual_request_id,
            };
            ledgers(ctx, client, filters, all).await
        }
    };

    store.shutdown().await;
    result
}

fn fail(ctx: &AppContext, err: ApiError) -> anyhow::Error {
    ctx.handle_api_error(Surface::Admin, err)
}

async fn requests(
    ctx: &AppContext,
    store: &AccrualStore,
    filters: AccrualRequestFilters,
    all: bool,
) -> anyhow::Result<()> {
    let list = store.infinite_list(filters);
    let data = load_pages(&list, all).await.map_err(|e| fail(ctx, e))?;
    let mut out = io::stdout();
    write_list(&mut out, &data, |w, r| write_request_row(w, r))?;
    Ok(())
}

async fn requests_page(
    ctx: &AppContext,
    store: &AccrualStore,
    filters: &AccrualRequestFilters,
    page: u32,
) -> anyhow::Result<()> {
    let request = PageRequest {
        page,
        size: ADMIN_PAGE_SIZE,
    };
    let data = store.list(filters, request).await.map_err(|e| fail(ctx, e))?;
    write_page(&mut io::stdout(), &data, request, |w, r| write_request_row(w, r))?;
    Ok(())
}

async fn search_requests(
    ctx: &AppContext,
    store: &AccrualStore,
    status: Option<AccrualStatus>,
) -> anyhow::Result<()> {
    let mut list = store.infinite_list(AccrualRequestFilters {
        status,
        ..AccrualRequestFilters::default()
    });
    let first = list.load().await.map_err(|e| fail(ctx, e))?;
    let mut out = io::stdout();
    write_list(&mut out, &first, |w, r| write_request_row(w, r))?;
    writeln!(out, "Type a keyword and press enter. Ctrl-D to finish.")?;

    search(
        tokio::io::stdin(),
        &mut list,
        ADMIN_SEARCH_DEBOUNCE,
        |current, keyword| AccrualRequestFilters {
            keyword,
            ..current.clone()
        },
        |data| {
            let mut out = io::stdout();
            writeln!(out)?;
            write_list(&mut out, data, |w, r| write_request_row(w, r))
        },
    )
    .await?
    .map_err(|e| fail(ctx, e))
}

/// Approve when `reason` is `None`, reject otherwise. The queue's first page
/// is loaded beforehand so the optimistic patch and the reconciling refetch
/// have something to act on.
async fn review(
    ctx: &AppContext,
    store: &AccrualStore,
    id: &EntityId,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let list = store.infinite_list(AccrualRequestFilters::default());
    list.load().await.map_err(|e| fail(ctx, e))?;

    let mutations = ReviewMutations::new(store.clone(), Arc::new(TerminalNotifier));
    let outcome = match reason {
        None => mutations.approve(id).await,
        Some(reason) => mutations.reject(id, reason).await,
    };
    if !review_sent(ctx, outcome)? {
        return Ok(());
    }

    store.settled().await;
    if let Some(request) = list
        .data()
        .await
        .and_then(|data| data.items().find(|r| &r.id == id).cloned())
    {
        write_request_detail(&mut io::stdout(), &request)?;
    }
    Ok(())
}

/// Whether the review reached the server. A blank reason is refused locally
/// and has already been reported by the notifier, so it is not an error here.
pub fn review_sent(ctx: &AppContext, outcome: Result<(), ReviewError>) -> anyhow::Result<bool> {
    match outcome {
        Ok(()) => Ok(true),
        Err(ReviewError::EmptyReason) => Ok(false),
        Err(ReviewError::Api(e)) => Err(fail(ctx, e)),
    }
}

async fn ledgers(
    ctx: &AppContext,
    client: Arc<ApiClient>,
    filters: AdminLedgerFilters,
    all: bool,
) -> anyhow::Result<()> {
    let loader = page_loader(move |filters: AdminLedgerFilters, page| {
        let client = Arc::clone(&client);
        async move { AdminApi::list_miles_ledgers(client.as_ref(), &filters, page).await }
    });
    let list: InfiniteList<MileageLedgerEntry, AdminLedgerFilters> = InfiniteList::new(
        QueryCache::new(ctx.cache_config()),
        LEDGERS_INFINITE_SCOPE,
        ADMIN_PAGE_SIZE,
        loader,
        filters,
    );
    let data = load_pages(&list, all).await.map_err(|e| fail(ctx, e))?;
    let mut out = io::stdout();
    write_list(&mut out, &data, |w, e| write_ledger_row(w, e))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mileage_client::ErrorKind;
    use mileage_core::Config;

    use super::*;
    use crate::config::Credentials;

    fn ctx() -> AppContext {
        AppContext::new(Config::default(), Credentials::default(), None)
    }

    #[test]
    fn blank_reason_is_not_reported_twice() {
        assert!(!review_sent(&ctx(), Err(ReviewError::EmptyReason)).unwrap());
    }

    #[test]
    fn server_failure_is_an_error() {
        let err = ApiError::new(ErrorKind::NotFound, "NOT_FOUND", "Not Found");
        let out = review_sent(&ctx(), Err(ReviewError::Api(err)));
        assert!(out.unwrap_err().to_string().contains("Not Found"));
    }

    #[test]
    fn page_flag_conflicts_with_all() {
        use clap::Parser;

        #[derive(Parser, Debug)]
        struct Cmd {
            #[command(subcommand)]
            action: AdminAction,
        }

        let parsed = Cmd::try_parse_from(["admin", "requests", "--page", "2"]).unwrap();
        assert!(matches!(parsed.action, AdminAction::Requests { page: Some(2), .. }));
        assert!(Cmd::try_parse_from(["admin", "requests", "--page", "2", "--all"]).is_err());
        assert!(Cmd::try_parse_from(["admin", "requests", "--page", "0"]).is_err());
    }
}
