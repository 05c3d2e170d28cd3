//! Session guard: decides whether a screen may render for the current session.

use chrono::{DateTime, Utc};

use crate::auth::{TokenSet, UserClaims};
use crate::error::ApiError;

/// Which front-end is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Operator portal.
    Admin,
    /// Member-facing apps.
    Member,
}

/// Kind of screen being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Login page, `/callback`.
    Public,
    /// Onboarding form.
    Onboarding,
    /// Everything else.
    Protected,
}

/// Outcome of [`SessionGuard::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToOnboarding,
    RedirectToHome,
}

/// What the front-end should do with an error that survived the 401 retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnauthorizedReaction {
    RedirectToLogin,
    Toast(String),
}

/// Current sign-in state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub tokens: Option<TokenSet>,
    pub claims: Option<UserClaims>,
}

impl Session {
    /// Signed in with a token that has not expired yet, or that can be renewed.
    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.tokens
            .as_ref()
            .is_some_and(|t| t.expires_at > now || t.refresh_token.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct SessionGuard {
    onboarded_claim: String,
}

impl SessionGuard {
    pub fn new(onboarded_claim: impl Into<String>) -> Self {
        Self {
            onboarded_claim: onboarded_claim.into(),
        }
    }

    pub fn evaluate(&self, session: &Session, route: RouteKind) -> GuardDecision {
        if route == RouteKind::Public {
            return GuardDecision::Allow;
        }
        if !session.is_authenticated(Utc::now()) {
            return GuardDecision::RedirectToLogin;
        }
        let onboarded = session
            .claims
            .as_ref()
            .is_some_and(|c| c.is_onboarded(&self.onboarded_claim));
        match (route, onboarded) {
            (RouteKind::Onboarding, true) => GuardDecision::RedirectToHome,
            (RouteKind::Protected, false) => GuardDecision::RedirectToOnboarding,
            _ => GuardDecision::Allow,
        }
    }

    /// Map a hard authorization failure to the surface's reaction: members are
    /// sent back to login, operators get a toast.
    pub fn on_unauthorized(surface: Surface, err: &ApiError) -> Option<UnauthorizedReaction> {
        if !err.is_unauthorized() {
            return None;
        }
        Some(match surface {
            Surface::Member => UnauthorizedReaction::RedirectToLogin,
            Surface::Admin => UnauthorizedReaction::Toast(format!(
                "Your session has expired: {}",
                err.message
            )),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CLAIM: &str = "https://mileage.app/onboarded";

    fn session(onboarded: Option<bool>) -> Session {
        let claims = onboarded.map(|flag| {
            let mut map = serde_json::Map::new();
            map.insert("sub".into(), "u1".into());
            map.insert(CLAIM.into(), flag.into());
            UserClaims(map)
        });
        Session {
            tokens: Some(TokenSet {
                access_token: "a".into(),
                refresh_token: None,
                id_token: None,
                expires_at: Utc::now() + chrono::Duration::seconds(600),
            }),
            claims,
        }
    }

    #[test]
    fn anonymous_user_goes_to_login() {
        let guard = SessionGuard::new(CLAIM);
        assert_eq!(
            guard.evaluate(&Session::default(), RouteKind::Protected),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(
            guard.evaluate(&Session::default(), RouteKind::Public),
            GuardDecision::Allow
        );
    }

    #[test]
    fn not_onboarded_user_goes_to_onboarding() {
        let guard = SessionGuard::new(CLAIM);
        assert_eq!(
            guard.evaluate(&session(Some(false)), RouteKind::Protected),
            GuardDecision::RedirectToOnboarding
        );
        assert_eq!(
            guard.evaluate(&session(None), RouteKind::Protected),
            GuardDecision::RedirectToOnboarding
        );
        assert_eq!(
            guard.evaluate(&session(Some(false)), RouteKind::Onboarding),
            GuardDecision::Allow
        );
    }

    #[test]
    fn onboarded_user_is_allowed_and_skips_onboarding() {
        let guard = SessionGuard::new(CLAIM);
        assert_eq!(
            guard.evaluate(&session(Some(true)), RouteKind::Protected),
            GuardDecision::Allow
        );
        assert_eq!(
            guard.evaluate(&session(Some(true)), RouteKind::Onboarding),
            GuardDecision::RedirectToHome
        );
    }

    #[test]
    fn expired_token_without_refresh_is_anonymous() {
        let mut s = session(Some(true));
        if let Some(t) = s.tokens.as_mut() {
            t.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
        let guard = SessionGuard::new(CLAIM);
        assert_eq!(
            guard.evaluate(&s, RouteKind::Protected),
            GuardDecision::RedirectToLogin
        );
    }

    #[test]
    fn unauthorized_reaction_depends_on_surface() {
        let err = ApiError::unauthorized("token revoked");
        assert_eq!(
            SessionGuard::on_unauthorized(Surface::Member, &err),
            Some(UnauthorizedReaction::RedirectToLogin)
        );
        assert!(matches!(
            SessionGuard::on_unauthorized(Surface::Admin, &err),
            Some(UnauthorizedReaction::Toast(_))
        ));
        let other = ApiError::cancelled();
        assert_eq!(SessionGuard::on_unauthorized(Surface::Member, &other), None);
    }
}
