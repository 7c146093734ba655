//! Request context passed with every operation.

use crate::types::ContextId;

/// The user or system actor issuing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Identifier of the actor.
    pub id: String,
    /// Collection the actor belongs to (e.g. `users`).
    pub collection: String,
}

impl Principal {
    /// Creates a principal.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
        }
    }
}

/// Correlates all database operations issued while handling one logical request.
///
/// The context does not own its transaction. The session registry maps
/// [`RequestContext::id`] to the open transaction, so a context can be cloned
/// freely across concurrent sub-operations of the same request and they all
/// resolve to the same transaction.
///
/// Principal, locale and draft flags are carried for the calling layer; the
/// core passes them through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    id: ContextId,
    principal: Option<Principal>,
    locale: Option<String>,
    draft: bool,
}

impl RequestContext {
    /// Creates a context with a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(ContextId::new())
    }

    /// Creates a context with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(id: ContextId) -> Self {
        Self {
            id,
            principal: None,
            locale: None,
            draft: false,
        }
    }

    /// Sets the acting principal.
    #[must_use]
    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Sets the locale.
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Sets the draft flag.
    #[must_use]
    pub fn draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    /// Returns the context identifier.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the acting principal, if any.
    #[must_use]
    pub fn acting_principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Returns the requested locale, if any.
    #[must_use]
    pub fn requested_locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Returns whether the request targets drafts.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.draft
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let ctx = RequestContext::new()
            .principal(Principal::new("users", "42"))
            .locale("en")
            .draft(true);
        let copy = ctx.clone();

        assert_eq!(copy.id(), ctx.id());
        assert_eq!(copy.acting_principal().map(|p| p.id.as_str()), Some("42"));
        assert_eq!(copy.requested_locale(), Some("en"));
        assert!(copy.is_draft());
    }

    #[test]
    fn fresh_contexts_differ() {
        assert_ne!(RequestContext::new().id(), RequestContext::new().id());
    }
}
