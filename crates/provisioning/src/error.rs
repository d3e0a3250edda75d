//! Failure taxonomy
//!
//! Every failed operation carries a [`LastError`] attributing the failure to a
//! [`Component`] with a machine readable [`Reason`]. [`reason_for_error`]
//! derives both from an arbitrary error by walking its `source()` chain to
//! the root cause and matching, in order:
//!
//! 1. Kubernetes API status errors (`k8s client - keb`)
//! 2. Kubernetes unexpected-object, no-match and ambiguous errors
//! 3. Errors that report their own reason and component ([`ErrorReporter`])
//! 4. Provisioner GraphQL errors carrying `error_reason` / `error_component`
//! 5. Anything mentioning [`OPERATION_TIMEOUT_MSG`]
//! 6. Everything else is `err_keb_internal` / `keb`

use crate::hyperscaler::AccountPoolError;
use crate::k8s::ControlPlaneError;
use crate::storage::StorageError;
use provisioner_client::GraphQlError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// Sentinel every timeout failure message contains
pub const OPERATION_TIMEOUT_MSG: &str = "operation has reached the time limit";

/// Machine readable failure code
///
/// Codes produced by subsystems are passed through verbatim, so this is an
/// open string type with the broker's own codes as constants.
///
/// ```
/// use provisioning_engine::Reason;
///
/// assert_eq!(Reason::KEB_TIMEOUT.as_str(), "err_keb_timeout");
/// assert_eq!(Reason::new("err_quota"), Reason::new("err_quota"));
/// assert_eq!(Reason::default(), Reason::NOT_SET);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reason(Cow<'static, str>);

impl Reason {
    /// Failure recorded without a message
    pub const MSG_NOT_SET: Reason = Reason(Cow::Borrowed("err_msg_not_set"));
    /// No reason was attributed
    pub const NOT_SET: Reason = Reason(Cow::Borrowed("err_not_set"));
    /// Broker-side failure with no more specific code
    pub const KEB_INTERNAL: Reason = Reason(Cow::Borrowed("err_keb_internal"));
    /// Operation or step ran past its time limit
    pub const KEB_TIMEOUT: Reason = Reason(Cow::Borrowed("err_keb_timeout"));
    /// Provisioner reported a failed operation without saying why
    pub const PROVISIONER_NIL_LAST_ERROR: Reason = Reason(Cow::Borrowed("err_provisioner_nil_last_error"));
    /// Unexpected HTTP status from a subsystem
    pub const HTTP_STATUS_CODE: Reason = Reason(Cow::Borrowed("err_http_status_code"));
    /// Managed cluster or one of its resources is missing
    pub const CLUSTER_NOT_FOUND: Reason = Reason(Cow::Borrowed("err_cluster_not_found"));
    /// Kubernetes API failure without a usable status reason
    pub const K8S_UNEXPECTED_SERVER_ERROR: Reason = Reason(Cow::Borrowed("err_k8s_unexpected_server_error"));
    /// Kubernetes returned an object of the wrong shape
    pub const K8S_UNEXPECTED_OBJECT_ERROR: Reason = Reason(Cow::Borrowed("err_k8s_unexpected_object_error"));
    /// Resource kind is not served by the cluster
    pub const K8S_NO_MATCH_ERROR: Reason = Reason(Cow::Borrowed("err_k8s_no_match_error"));
    /// Resource kind matches more than one API group
    pub const K8S_AMBIGUOUS_ERROR: Reason = Reason(Cow::Borrowed("err_k8s_ambiguous_error"));

    /// Pass-through code from a subsystem
    pub fn new(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    /// Wire value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank value, as left by a subsystem that sent none
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Reason {
    fn default() -> Self {
        Self::NOT_SET
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// System blamed for a failure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Component(Cow<'static, str>);

impl Component {
    /// Nobody was blamed
    pub const UNKNOWN: Component = Component(Cow::Borrowed("unknown"));
    /// Operation and instance storage
    pub const KEB_DB: Component = Component(Cow::Borrowed("db - keb"));
    /// Broker's Kubernetes client
    pub const K8S_CLIENT: Component = Component(Cow::Borrowed("k8s client - keb"));
    /// The broker itself
    pub const KEB: Component = Component(Cow::Borrowed("keb"));
    /// Enterprise data platform
    pub const EDP: Component = Component(Cow::Borrowed("edp"));
    /// Runtime provisioner
    pub const PROVISIONER: Component = Component(Cow::Borrowed("provisioner"));
    /// Kyma reconciler
    pub const RECONCILER: Component = Component(Cow::Borrowed("reconciler"));
    /// Infrastructure manager owning Runtime resources
    pub const INFRASTRUCTURE_MANAGER: Component = Component(Cow::Borrowed("infrastructure-manager"));
    /// Lifecycle manager owning Kyma resources
    pub const LIFECYCLE_MANAGER: Component = Component(Cow::Borrowed("lifecycle-manager"));
    /// Hyperscaler account pool
    pub const ACCOUNT_POOL: Component = Component(Cow::Borrowed("account-pool"));

    /// Pass-through component name from a subsystem
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Wire value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank value, as left by a subsystem that sent none
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Component {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An error that knows which reason and component it should be reported with
pub trait ErrorReporter: StdError {
    /// Code stored as the operation's last error reason
    fn reason(&self) -> Reason;
    /// System the failure is attributed to
    fn component(&self) -> Component;
}

/// Failure attribution stored on the operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Human readable description
    #[serde(default)]
    pub message: String,
    /// Machine readable code
    #[serde(default)]
    pub reason: Reason,
    /// System blamed
    #[serde(default)]
    pub component: Component,
    /// Step that failed, empty when unknown
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step: String,
}

impl LastError {
    /// Attribution without a step
    pub fn new(message: impl Into<String>, reason: Reason, component: Component) -> Self {
        Self {
            message: message.into(),
            reason,
            component,
            step: String::new(),
        }
    }

    /// Timeout failure blamed on the broker itself
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message, Reason::KEB_TIMEOUT, Component::KEB)
    }

    /// Same attribution, naming the failed step
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    /// True until the operation has failed once
    pub fn is_not_set(&self) -> bool {
        self.reason == Reason::NOT_SET
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for LastError {}

impl ErrorReporter for LastError {
    fn reason(&self) -> Reason {
        self.reason.clone()
    }

    fn component(&self) -> Component {
        self.component.clone()
    }
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Marks a failure as worth retrying
///
/// A wrapped cause keeps its own classification: the cause is the root of
/// the chain, so [`reason_for_error`] never sees the wrapper.
#[derive(Debug)]
pub struct TemporaryError {
    message: String,
    source: Option<BoxError>,
}

impl TemporaryError {
    /// Retryable failure without an underlying cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Retryable failure caused by `source`
    pub fn wrap(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl fmt::Display for TemporaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for TemporaryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

impl ErrorReporter for TemporaryError {
    fn reason(&self) -> Reason {
        Reason::KEB_INTERNAL
    }

    fn component(&self) -> Component {
        Component::KEB
    }
}

/// The managed cluster or one of its resources does not exist (yet)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotFoundError;

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not found")
    }
}

impl StdError for NotFoundError {}

impl ErrorReporter for NotFoundError {
    fn reason(&self) -> Reason {
        Reason::CLUSTER_NOT_FOUND
    }

    fn component(&self) -> Component {
        Component::RECONCILER
    }
}

impl ErrorReporter for StorageError {
    fn reason(&self) -> Reason {
        Reason::KEB_INTERNAL
    }

    fn component(&self) -> Component {
        Component::KEB_DB
    }
}

impl ErrorReporter for AccountPoolError {
    fn reason(&self) -> Reason {
        Reason::KEB_INTERNAL
    }

    fn component(&self) -> Component {
        Component::ACCOUNT_POOL
    }
}

/// Iterate an error and its causes, outermost first
pub fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Innermost cause of an error
pub fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    chain(err).last().unwrap_or(err)
}

/// Classify an error into a [`LastError`]
///
/// The message is always the outermost error's text; `step` is left empty
/// unless the cause names one.
pub fn reason_for_error(err: &(dyn StdError + 'static)) -> LastError {
    let message = err.to_string();
    let cause = root_cause(err);

    if let Some(e) = cause.downcast_ref::<ControlPlaneError>() {
        if let Some(reason) = k8s_reason(e) {
            return LastError::new(message, reason, Component::K8S_CLIENT);
        }
    }

    if let Some((reason, component)) = reported(cause) {
        return LastError::new(message, reason, component);
    }

    if let Some(e) = cause
        .downcast_ref::<GraphQlError>()
        .filter(|e| e.reason().is_some() || e.component().is_some())
    {
        let mut last = LastError::new(
            message,
            Reason::new(e.reason().unwrap_or_default()),
            Component::new(e.component().unwrap_or_default()),
        );
        if let Some(step) = e.step() {
            last.step = step.to_string();
        }
        return last;
    }

    if chain(err).any(|e| e.to_string().contains(OPERATION_TIMEOUT_MSG)) {
        return LastError::timeout(message);
    }

    LastError::new(message, Reason::KEB_INTERNAL, Component::KEB)
}

fn k8s_reason(err: &ControlPlaneError) -> Option<Reason> {
    match err {
        ControlPlaneError::Api { reason, message, .. } => {
            if reason.is_empty() || is_unexpected_server_error(reason, message) {
                Some(Reason::K8S_UNEXPECTED_SERVER_ERROR)
            } else {
                Some(Reason::new(reason.clone()))
            }
        }
        ControlPlaneError::UnexpectedObject(_) => Some(Reason::K8S_UNEXPECTED_OBJECT_ERROR),
        ControlPlaneError::NoMatch(_) => Some(Reason::K8S_NO_MATCH_ERROR),
        ControlPlaneError::Ambiguous(_) => Some(Reason::K8S_AMBIGUOUS_ERROR),
        _ => None,
    }
}

fn is_unexpected_server_error(reason: &str, message: &str) -> bool {
    reason == "InternalError" && message.contains("unexpected")
}

fn reported(cause: &(dyn StdError + 'static)) -> Option<(Reason, Component)> {
    fn pair<E: ErrorReporter>(e: &E) -> (Reason, Component) {
        (e.reason(), e.component())
    }

    if let Some(e) = cause.downcast_ref::<LastError>() {
        return Some(pair(e));
    }
    if let Some(e) = cause.downcast_ref::<TemporaryError>() {
        return Some(pair(e));
    }
    if let Some(e) = cause.downcast_ref::<NotFoundError>() {
        return Some(pair(e));
    }
    if let Some(e) = cause.downcast_ref::<StorageError>() {
        return Some(pair(e));
    }
    if let Some(e) = cause.downcast_ref::<AccountPoolError>() {
        return Some(pair(e));
    }
    None
}

/// Whether any error in the chain was marked temporary
pub fn is_temporary(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| e.is::<TemporaryError>())
}

/// Whether any error in the chain means "does not exist"
pub fn is_not_found(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        e.is::<NotFoundError>()
            || e.downcast_ref::<StorageError>().is_some_and(StorageError::is_not_found)
            || e.downcast_ref::<ControlPlaneError>().is_some_and(ControlPlaneError::is_not_found)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner_client::ProvisionerError;
    use provisioner_client::error::{EXTENSION_ERROR_COMPONENT, EXTENSION_ERROR_REASON, EXTENSION_ERROR_STEP};

    #[derive(Debug, thiserror::Error)]
    #[error("{context}: {source}")]
    struct Wrapped {
        context: String,
        #[source]
        source: BoxError,
    }

    fn wrap(context: &str, source: impl Into<BoxError>) -> Wrapped {
        Wrapped {
            context: context.to_string(),
            source: source.into(),
        }
    }

    #[test]
    fn test_k8s_api_error_reason_is_passed_through() {
        let err = wrap(
            "while getting kyma",
            ControlPlaneError::Api {
                code: 409,
                reason: "AlreadyExists".to_string(),
                message: "kymas \"abc\" already exists".to_string(),
            },
        );

        let last = reason_for_error(&err);

        assert_eq!(last.reason, Reason::new("AlreadyExists"));
        assert_eq!(last.component, Component::K8S_CLIENT);
        assert_eq!(last.message, err.to_string());
    }

    #[test]
    fn test_k8s_unexpected_server_error() {
        let err = ControlPlaneError::Api {
            code: 500,
            reason: String::new(),
            message: "an error on the server has prevented the request from succeeding".to_string(),
        };
        assert_eq!(reason_for_error(&err).reason, Reason::K8S_UNEXPECTED_SERVER_ERROR);

        let err = ControlPlaneError::NoMatch("no matches for kind Kyma".to_string());
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::K8S_NO_MATCH_ERROR);
        assert_eq!(last.component, Component::K8S_CLIENT);
    }

    #[test]
    fn test_chain_walks_to_root_cause() {
        let err = wrap("applying kyma", wrap("reading template", NotFoundError));

        let messages: Vec<String> = chain(&err).map(ToString::to_string).collect();

        assert_eq!(
            messages,
            vec!["applying kyma: reading template: not found", "reading template: not found", "not found"]
        );
        assert!(root_cause(&err).is::<NotFoundError>());
    }

    #[test]
    fn test_reporter_is_adopted() {
        let err = wrap("while resolving secret", StorageError::Internal("connection reset".to_string()));
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::KEB_INTERNAL);
        assert_eq!(last.component, Component::KEB_DB);

        let err = wrap("while getting kubeconfig", NotFoundError);
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::CLUSTER_NOT_FOUND);
        assert_eq!(last.component, Component::RECONCILER);
    }

    #[test]
    fn test_temporary_wrapper_delegates_to_cause() {
        let err = TemporaryError::wrap(
            "unable to create secret",
            ControlPlaneError::Api {
                code: 403,
                reason: "Forbidden".to_string(),
                message: "forbidden".to_string(),
            },
        );
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::new("Forbidden"));
        assert_eq!(last.component, Component::K8S_CLIENT);
        assert!(is_temporary(&err));

        let bare = TemporaryError::new("try later");
        let last = reason_for_error(&bare);
        assert_eq!(last.reason, Reason::KEB_INTERNAL);
        assert_eq!(last.component, Component::KEB);
    }

    #[test]
    fn test_graphql_extensions_are_adopted() {
        let gql = GraphQlError::new("shoot quota exceeded")
            .with_extension(EXTENSION_ERROR_REASON, "err_quota")
            .with_extension(EXTENSION_ERROR_COMPONENT, "gardener")
            .with_extension(EXTENSION_ERROR_STEP, "WaitForClusterCreation");
        let err = ProvisionerError::from(gql);

        let last = reason_for_error(&err);

        assert_eq!(last.reason, Reason::new("err_quota"));
        assert_eq!(last.component, Component::new("gardener"));
        assert_eq!(last.step, "WaitForClusterCreation");
    }

    #[test]
    fn test_timeout_and_fallback() {
        let err = LastError::timeout(format!("{OPERATION_TIMEOUT_MSG}: 6h"));
        assert_eq!(reason_for_error(&err).reason, Reason::KEB_TIMEOUT);

        let err = wrap("apply", std::io::Error::other(format!("{OPERATION_TIMEOUT_MSG}: 1h")));
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::KEB_TIMEOUT);
        assert_eq!(last.component, Component::KEB);

        let err = std::io::Error::other("boom");
        let last = reason_for_error(&err);
        assert_eq!(last.reason, Reason::KEB_INTERNAL);
        assert_eq!(last.component, Component::KEB);
        assert_eq!(last.message, "boom");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(&wrap("x", NotFoundError)));
        assert!(is_not_found(&StorageError::NotFound("instance".to_string())));
        assert!(is_not_found(&ControlPlaneError::Api {
            code: 404,
            reason: "NotFound".to_string(),
            message: "not found".to_string(),
        }));
        assert!(!is_not_found(&StorageError::Conflict("op".to_string())));
        assert!(!is_temporary(&StorageError::Conflict("op".to_string())));
    }

    #[test]
    fn test_last_error_wire_format() {
        let last = LastError::default();
        assert!(last.is_not_set());
        let json = serde_json::to_value(&last).unwrap();
        assert_eq!(json["reason"], "err_not_set");
        assert_eq!(json["component"], "unknown");

        let back: LastError =
            serde_json::from_str(r#"{"message":"m","reason":"err_keb_timeout","component":"provisioner"}"#).unwrap();
        assert_eq!(back.reason, Reason::KEB_TIMEOUT);
        assert_eq!(back.component, Component::PROVISIONER);
    }
}
