//! Kyma resource identity
//!
//! The Kyma resource is applied from a user-tunable template, so it is never
//! deserialized into a typed struct. Only its API coordinates live here.

use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;

/// API group of the Kyma resource
pub const KYMA_GROUP: &str = "operator.kyma-project.io";
/// API version of the Kyma resource
pub const KYMA_VERSION: &str = "v1beta2";
/// Kind of the Kyma resource
pub const KYMA_KIND: &str = "Kyma";
/// Plural used in the REST path
pub const KYMA_PLURAL: &str = "kymas";

/// `ApiResource` for dynamic access to Kyma objects
#[must_use]
pub fn kyma_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(KYMA_GROUP, KYMA_VERSION, KYMA_KIND),
        KYMA_PLURAL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kyma_api_resource() {
        let ar = kyma_api_resource();
        assert_eq!(ar.group, "operator.kyma-project.io");
        assert_eq!(ar.version, "v1beta2");
        assert_eq!(ar.api_version, "operator.kyma-project.io/v1beta2");
        assert_eq!(ar.kind, "Kyma");
        assert_eq!(ar.plural, "kymas");
    }
}
