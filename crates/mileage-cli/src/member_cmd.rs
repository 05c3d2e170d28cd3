//! Member subcommands: request tracking, submission, ledger history, profile
//! and onboarding.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;

use mileage_client::api::{
    ApiVersion, MemberApi, MemberLedgerFilters, MemberRequestFilters, PageRequest,
};
use mileage_client::debounce::MEMBER_SEARCH_DEBOUNCE;
use mileage_client::guard::{RouteKind, Surface};
use mileage_client::media::{MediaUploader, ResourceType};
use mileage_client::pagination::{
    LEDGERS_INFINITE_SCOPE, MEMBER_TRACKING_PAGE_SIZE, page_loader,
};
use mileage_client::{ApiClient, ApiError, InfiniteList, QueryCache};
use mileage_core::models::{CustomerUpdate, OnboardRequest, ProfileUpdate};
use mileage_core::{AccrualRequest, AccrualRequestForm, MileageLedgerEntry};

use crate::context::AppContext;
use crate::fmt::{write_ledger_row, write_list, write_profile, write_request_detail, write_request_row};
use crate::listing::{load_pages, search};

/// Cache scope of the member tracking list.
pub const TRACKING_SCOPE: &str = "member-accrual-requests-infinite";
/// Ledger history page size.
pub const LEDGER_PAGE_SIZE: u32 = 20;

type TrackingList = InfiniteList<AccrualRequest, MemberRequestFilters>;

/// Member subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum MemberAction {
    /// Track submitted accrual requests.
    Requests {
        /// Keyword (PNR or ticket number).
        #[arg(short, long)]
        keyword: Option<String>,
        /// Load every page.
        #[arg(short, long)]
        all: bool,
        /// Use the v2 listing endpoint.
        #[arg(long)]
        v2: bool,
    },
    /// Search submitted requests interactively, one keyword per line.
    Search {
        /// Use the v2 listing endpoint.
        #[arg(long)]
        v2: bool,
    },
    /// Submit a flight for mileage accrual.
    Submit(SubmitArgs),
    /// Miles ledger history.
    Ledgers {
        /// Earliest date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Ledger transaction ID.
        #[arg(long)]
        transaction_id: Option<String>,
        /// Load every page.
        #[arg(short, long)]
        all: bool,
    },
    /// Show or update the member profile.
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
    /// Finish setting up a new account.
    Onboard {
        /// Full name.
        #[arg(long)]
        name: String,
        /// Phone number.
        #[arg(long)]
        phone: String,
        /// Date of birth (YYYY-MM-DD).
        #[arg(long)]
        date_of_birth: Option<NaiveDate>,
    },
}

#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    /// 13-digit ticket number.
    #[arg(long)]
    pub ticket: String,
    /// Booking reference.
    #[arg(long)]
    pub pnr: String,
    /// Airline code.
    #[arg(long)]
    pub carrier: String,
    /// Booking class.
    #[arg(long = "class")]
    pub booking_class: String,
    /// Origin airport code.
    #[arg(long)]
    pub from: String,
    /// Destination airport code.
    #[arg(long)]
    pub to: String,
    /// Departure date (YYYY-MM-DD).
    #[arg(long)]
    pub date: NaiveDate,
    /// Ticket image: a local file (uploaded first) or a URL.
    #[arg(long)]
    pub ticket_image: String,
    /// Boarding pass: a local file (uploaded first) or a URL.
    #[arg(long)]
    pub boarding_pass: String,
}

#[derive(clap::Subcommand, Debug)]
pub enum ProfileAction {
    /// Show the profile (default).
    Show,
    /// Update contact details.
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Also updates the customer record.
        #[arg(long)]
        date_of_birth: Option<NaiveDate>,
    },
}

/// Execute a member subcommand.
pub async fn run(action: MemberAction, ctx: &AppContext) -> anyhow::Result<()> {
    let route = if matches!(action, MemberAction::Onboard { .. }) {
        RouteKind::Onboarding
    } else {
        RouteKind::Protected
    };
    ctx.require(route)?;
    let client = Arc::new(ctx.api()?);

    match action {
        MemberAction::Requests { keyword, all, v2 } => {
            let list = tracking_list(ctx, &client, version(v2), MemberRequestFilters { keyword });
            let data = load_pages(&list, all).await.map_err(|e| fail(ctx, e))?;
            write_list(&mut io::stdout(), &data, |w, r| write_request_row(w, r))?;
            Ok(())
        }
        MemberAction::Search { v2 } => {
            let mut list = tracking_list(ctx, &client, version(v2), MemberRequestFilters::default());
            let first = list.load().await.map_err(|e| fail(ctx, e))?;
            let mut out = io::stdout();
            write_list(&mut out, &first, |w, r| write_request_row(w, r))?;
            writeln!(out, "Type a keyword and press enter. Ctrl-D to finish.")?;
            search(
                tokio::io::stdin(),
                &mut list,
                MEMBER_SEARCH_DEBOUNCE,
                |_, keyword| MemberRequestFilters { keyword },
                |data| {
                    let mut out = io::stdout();
                    writeln!(out)?;
                    write_list(&mut out, data, |w, r| write_request_row(w, r))
                },
            )
            .await?
            .map_err(|e| fail(ctx, e))
        }
        MemberAction::Submit(args) => submit(ctx, &client, args).await,
        MemberAction::Ledgers {
            from,
            to,
            transaction_id,
            all,
        } => {
            let filters = MemberLedgerFilters {
                date_from: from,
                date_to: to,
                transaction_id,
            };
            ledgers(ctx, client, filters, all).await
        }
        MemberAction::Profile { action } => profile(ctx, &client, action).await,
        MemberAction::Onboard {
            name,
            phone,
            date_of_birth,
        } => {
            let request = OnboardRequest {
                name,
                phone,
                date_of_birth,
            };
            onboard(ctx, &client, &request).await
        }
    }
}

const fn version(v2: bool) -> ApiVersion {
    if v2 { ApiVersion::V2 } else { ApiVersion::V1 }
}

fn fail(ctx: &AppContext, err: ApiError) -> anyhow::Error {
    ctx.handle_api_error(Surface::Member, err)
}

fn tracking_list(
    ctx: &AppContext,
    client: &Arc<ApiClient>,
    version: ApiVersion,
    filters: MemberRequestFilters,
) -> TrackingList {
    let client = Arc::clone(client);
    let loader = page_loader(move |filters: MemberRequestFilters, page: PageRequest| {
        let client = Arc::clone(&client);
        async move {
            MemberApi::list_accrual_requests(client.as_ref(), version, &filters, page).await
        }
    });
    InfiniteList::new(
        QueryCache::new(ctx.cache_config()),
        TRACKING_SCOPE,
        MEMBER_TRACKING_PAGE_SIZE,
        loader,
        filters,
    )
}

/// Local files are uploaded to the media host; anything else is taken as an
/// already hosted URL.
async fn document_url(
    uploader: &MediaUploader,
    value: &str,
    resource: ResourceType,
) -> Result<String, ApiError> {
    let path = Path::new(value);
    if path.is_file() {
        let uploaded = uploader.upload_file(path, resource).await?;
        Ok(uploaded.secure_url)
    } else {
        Ok(value.to_string())
    }
}

async fn submit(ctx: &AppContext, client: &ApiClient, args: SubmitArgs) -> anyhow::Result<()> {
    let uploader = ctx.media()?;
    let ticket_image_url = document_url(&uploader, &args.ticket_image, ResourceType::Image)
        .await
        .map_err(|e| fail(ctx, e))?;
    let boarding_pass_url = document_url(&uploader, &args.boarding_pass, ResourceType::Auto)
        .await
        .map_err(|e| fail(ctx, e))?;

    let form = AccrualRequestForm {
        ticket_id: args.ticket,
        pnr: args.pnr,
        carrier: args.carrier,
        booking_class: args.booking_class,
        from_code: args.from,
        to_code: args.to,
        departure_date: args.date,
        ticket_image_url,
        boarding_pass_url,
    };
    let created = client
        .submit_accrual_request(&form)
        .await
        .map_err(|e| fail(ctx, e))?;

    let mut out = io::stdout();
    writeln!(out, "Accrual request submitted.")?;
    write_request_detail(&mut out, &created)?;
    Ok(())
}

async fn ledgers(
    ctx: &AppContext,
    client: Arc<ApiClient>,
    filters: MemberLedgerFilters,
    all: bool,
) -> anyhow::Result<()> {
    let loader = page_loader(move |filters: MemberLedgerFilters, page: PageRequest| {
        let client = Arc::clone(&client);
        async move { MemberApi::list_miles_ledgers(client.as_ref(), &filters, page).await }
    });
    let list: InfiniteList<MileageLedgerEntry, MemberLedgerFilters> = InfiniteList::new(
        QueryCache::new(ctx.cache_config()),
        LEDGERS_INFINITE_SCOPE,
        LEDGER_PAGE_SIZE,
        loader,
        filters,
    );
    let data = load_pages(&list, all).await.map_err(|e| fail(ctx, e))?;
    write_list(&mut io::stdout(), &data, |w, e| write_ledger_row(w, e))?;
    Ok(())
}

async fn profile(
    ctx: &AppContext,
    client: &ApiClient,
    action: Option<ProfileAction>,
) -> anyhow::Result<()> {
    let profile = match action.unwrap_or(ProfileAction::Show) {
        ProfileAction::Show => client.profile().await,
        ProfileAction::Update {
            name,
            phone,
            date_of_birth: None,
        } => client.update_profile(&ProfileUpdate { name, phone }).await,
        ProfileAction::Update {
            name,
            phone,
            date_of_birth,
        } => {
            client
                .update_customer(&CustomerUpdate {
                    name,
                    phone,
                    date_of_birth,
                })
                .await
        }
    }
    .map_err(|e| fail(ctx, e))?;
    write_profile(&mut io::stdout(), &profile)?;
    Ok(())
}

/// Create the customer record, then re-read claims so later commands see the
/// onboarded flag.
async fn onboard(ctx: &AppContext, client: &ApiClient, request: &OnboardRequest) -> anyhow::Result<()> {
    let profile = client.onboard(request).await.map_err(|e| fail(ctx, e))?;

    let mut creds = ctx.credentials();
    if let Some(tokens) = &creds.tokens {
        let claims = ctx
            .identity()?
            .user_claims(&tokens.access_token)
            .await
            .map_err(|e| fail(ctx, e))?;
        creds.claims = Some(claims);
        ctx.store_credentials(creds)?;
    }

    let mut out = io::stdout();
    writeln!(out, "Welcome aboard.")?;
    write_profile(&mut out, &profile)?;
    if ctx.require(RouteKind::Protected).is_err() {
        writeln!(
            out,
            "Your sign-in still predates onboarding. Run `mileage auth login` to refresh it."
        )?;
    }
    Ok(())
}
