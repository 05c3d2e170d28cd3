//! Accrual requests: a member's claim for miles, reviewed by an admin.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::id::EntityId;
use crate::error::{Error, FieldErrors};

/// Review status. Transitions are decided by the server only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccrualStatus {
    Pending,
    #[serde(rename = "inprogress")]
    InProgress,
    Approved,
    Rejected,
}

impl AccrualStatus {
    /// Whether an admin may still approve or reject the request.
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inprogress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccrualStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" | "in_progress" | "in-progress" => Ok(Self::InProgress),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::Config(format!("unknown accrual status {other:?}"))),
        }
    }
}

/// One accrual request as returned by the list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualRequest {
    pub id: EntityId,
    #[serde(default)]
    pub customer_id: Option<EntityId>,
    pub ticket_id: String,
    pub pnr: String,
    pub carrier: String,
    pub booking_class: String,
    pub from_code: String,
    pub to_code: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub qualifying_miles: i64,
    #[serde(default)]
    pub bonus_miles: i64,
    #[serde(default)]
    pub qualifying_accrual_rate: f64,
    #[serde(default)]
    pub bonus_accrual_rate: f64,
    #[serde(default)]
    pub distance: i64,
    #[serde(default)]
    pub ticket_image_url: Option<String>,
    #[serde(default)]
    pub boarding_pass_url: Option<String>,
    pub status: AccrualStatus,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccrualRequest {
    /// Route label, e.g. `SGN → HAN`.
    pub fn route(&self) -> String {
        format!("{} → {}", self.from_code, self.to_code)
    }
}

#[allow(clippy::expect_used)]
static PNR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{6}$").expect("static regex is valid"));
#[allow(clippy::expect_used)]
static AIRPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("static regex is valid"));
#[allow(clippy::expect_used)]
static CARRIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{2,3}$").expect("static regex is valid"));

/// Member submission payload for `POST /api/v1/accrual-requests/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualRequestForm {
    pub ticket_id: String,
    pub pnr: String,
    pub carrier: String,
    pub booking_class: String,
    pub from_code: String,
    pub to_code: String,
    pub departure_date: NaiveDate,
    pub ticket_image_url: String,
    pub boarding_pass_url: String,
}

impl AccrualRequestForm {
    /// Trim every field and upper-case the coded ones.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.ticket_id = self.ticket_id.trim().to_string();
        self.pnr = self.pnr.trim().to_ascii_uppercase();
        self.carrier = self.carrier.trim().to_ascii_uppercase();
        self.booking_class = self.booking_class.trim().to_ascii_uppercase();
        self.from_code = self.from_code.trim().to_ascii_uppercase();
        self.to_code = self.to_code.trim().to_ascii_uppercase();
        self.ticket_image_url = self.ticket_image_url.trim().to_string();
        self.boarding_pass_url = self.boarding_pass_url.trim().to_string();
        self
    }

    /// Field-level validation of an already normalized form.
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = FieldErrors::new();
        let mut push = |field: &str, msg: &str| {
            errors
                .entry(field.to_string())
                .or_default()
                .push(msg.to_string());
        };

        let required = [
            ("ticket_id", &self.ticket_id),
            ("pnr", &self.pnr),
            ("carrier", &self.carrier),
            ("booking_class", &self.booking_class),
            ("from_code", &self.from_code),
            ("to_code", &self.to_code),
            ("ticket_image_url", &self.ticket_image_url),
            ("boarding_pass_url", &self.boarding_pass_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                push(field, "is required");
            }
        }

        if !self.pnr.is_empty() && !PNR_RE.is_match(&self.pnr) {
            push("pnr", "must be 6 letters or digits");
        }
        if !self.carrier.is_empty() && !CARRIER_RE.is_match(&self.carrier) {
            push("carrier", "must be a 2-3 character airline code");
        }
        for (field, code) in [("from_code", &self.from_code), ("to_code", &self.to_code)] {
            if !code.is_empty() && !AIRPORT_RE.is_match(code) {
                push(field, "must be a 3-letter airport code");
            }
        }
        if !self.from_code.is_empty() && self.from_code == self.to_code {
            push("to_code", "must differ from origin");
        }
        for (field, url) in [
            ("ticket_image_url", &self.ticket_image_url),
            ("boarding_pass_url", &self.boarding_pass_url),
        ] {
            if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) {
                push(field, "must be an http(s) URL");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_form() -> AccrualRequestForm {
        AccrualRequestForm {
            ticket_id: "7382400123456".into(),
            pnr: " abc123 ".into(),
            carrier: "vn".into(),
            booking_class: "j".into(),
            from_code: "sgn".into(),
            to_code: "han".into(),
            departure_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            ticket_image_url: "https://media.test/ticket.jpg".into(),
            boarding_pass_url: "https://media.test/pass.jpg".into(),
        }
    }

    #[test]
    fn normalized_form_is_valid() {
        let form = valid_form().normalized();
        assert_eq!(form.pnr, "ABC123");
        assert_eq!(form.from_code, "SGN");
        assert!(form.validate().is_ok());
    }

    #[test]
    fn invalid_fields_are_reported_together() {
        let mut form = valid_form().normalized();
        form.pnr = "AB".into();
        form.to_code = "SGN".into();
        form.boarding_pass_url = String::new();
        let Err(Error::Validation(fields)) = form.validate() else {
            panic!("expected validation error");
        };
        assert!(fields.contains_key("pnr"));
        assert!(fields.contains_key("to_code"));
        assert_eq!(fields["boarding_pass_url"], vec!["is required".to_string()]);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AccrualStatus::InProgress).unwrap(),
            "\"inprogress\""
        );
        let s: AccrualStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(s, AccrualStatus::Rejected);
        assert!(AccrualStatus::Pending.is_actionable());
        assert!(AccrualStatus::InProgress.is_actionable());
        assert!(!AccrualStatus::Approved.is_actionable());
    }

    #[test]
    fn deserialize_request_with_numeric_id() {
        let json = r#"{
            "id": 245241133272138248,
            "ticket_id": "7382400123456",
            "pnr": "ABC123",
            "carrier": "VN",
            "booking_class": "J",
            "from_code": "SGN",
            "to_code": "HAN",
            "departure_date": "2024-05-01",
            "qualifying_miles": 1200,
            "bonus_miles": 300,
            "qualifying_accrual_rate": 1.5,
            "bonus_accrual_rate": 0.25,
            "distance": 800,
            "status": "pending",
            "created_at": "2024-05-02T08:00:00Z"
        }"#;
        let req: AccrualRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id.as_str(), "245241133272138248");
        assert_eq!(req.status, AccrualStatus::Pending);
        assert!(req.reviewed_by.is_none());
        assert_eq!(req.route(), "SGN → HAN");
    }
}
