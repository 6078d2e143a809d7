use super::{FieldSpec, KindSpec};

pub const CLUSTER: KindSpec = KindSpec {
    kind: "cluster",
    scope_field: None,
    required: &[],
    fields: &[
        FieldSpec::plain("tags", "tags"),
        FieldSpec::plain("settings", "settings"),
        FieldSpec::plain("configuration", "configuration"),
        FieldSpec::plain("capacity_providers", "capacityProviders"),
        FieldSpec::plain(
            "default_capacity_provider_strategy",
            "defaultCapacityProviderStrategy",
        ),
        FieldSpec::plain("service_connect_defaults", "serviceConnectDefaults"),
    ],
};
