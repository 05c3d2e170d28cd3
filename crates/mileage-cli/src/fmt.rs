//! Output formatting helpers.

use std::io::{self, Write};

use mileage_client::InfiniteData;
use mileage_client::api::PageRequest;
use mileage_core::{AccrualRequest, MileageLedgerEntry, Page, Profile};

pub fn write_request_row(w: &mut impl Write, r: &AccrualRequest) -> io::Result<()> {
    writeln!(
        w,
        "{:<20} {:<6} {:<3} {:<11} {:<10} {:>7} {}",
        r.id,
        r.pnr,
        r.carrier,
        r.route(),
        r.departure_date,
        r.qualifying_miles,
        r.status
    )
}

pub fn write_request_detail(w: &mut impl Write, r: &AccrualRequest) -> io::Result<()> {
    writeln!(w, "  Request:  {}", r.id)?;
    writeln!(w, "  Status:   {}", r.status)?;
    writeln!(w, "  Ticket:   {}", r.ticket_id)?;
    writeln!(w, "  PNR:      {}", r.pnr)?;
    writeln!(w, "  Flight:   {} {} ({})", r.carrier, r.route(), r.booking_class)?;
    writeln!(w, "  Date:     {}", r.departure_date)?;
    writeln!(
        w,
        "  Miles:    {} qualifying, {} bonus",
        r.qualifying_miles, r.bonus_miles
    )?;
    if let Some(by) = &r.reviewed_by {
        writeln!(w, "  Reviewer: {by}")?;
    }
    if let Some(reason) = &r.rejected_reason {
        writeln!(w, "  Reason:   {reason}")?;
    }
    Ok(())
}

pub fn write_ledger_row(w: &mut impl Write, e: &MileageLedgerEntry) -> io::Result<()> {
    let source = e
        .accrual_request_id
        .as_ref()
        .map_or_else(|| "adjustment".to_string(), |id| format!("request {id}"));
    writeln!(
        w,
        "{} {:>+8} {:>+8}  {}",
        e.created_at.format("%Y-%m-%d"),
        e.qualifying_miles_delta,
        e.bonus_miles_delta,
        source
    )
}

pub fn write_profile(w: &mut impl Write, p: &Profile) -> io::Result<()> {
    writeln!(w, "  Member:   {}", p.name)?;
    writeln!(w, "  Email:    {}", p.email)?;
    if let Some(phone) = &p.phone {
        writeln!(w, "  Phone:    {phone}")?;
    }
    writeln!(w, "  Tier:     {}", p.tier.label())?;
    writeln!(
        w,
        "  Miles:    {} qualifying, {} bonus",
        p.total_qualifying_miles, p.total_bonus_miles
    )?;
    Ok(())
}

/// Rows of every loaded page plus a "showing n of total" footer.
pub fn write_list<W: Write, T>(
    w: &mut W,
    data: &InfiniteData<T>,
    mut row: impl FnMut(&mut W, &T) -> io::Result<()>,
) -> io::Result<()> {
    if data.is_empty() {
        return writeln!(w, "No results.");
    }
    for item in data.items() {
        row(w, item)?;
    }
    write!(w, "Showing {} of {}", data.len(), data.total())?;
    if data.has_next_page() {
        write!(w, " (use --all to load everything)")?;
    }
    writeln!(w)
}

/// Rows of one numbered page plus a "page n of m" footer.
pub fn write_page<W: Write, T>(
    w: &mut W,
    page: &Page<T>,
    request: PageRequest,
    mut row: impl FnMut(&mut W, &T) -> io::Result<()>,
) -> io::Result<()> {
    if page.data.is_empty() {
        return writeln!(w, "No results on page {}.", request.page);
    }
    for item in &page.data {
        row(w, item)?;
    }
    let pages = page.total.div_ceil(u64::from(request.size.max(1)));
    writeln!(w, "Page {} of {pages} ({} total)", request.page, page.total)
}
