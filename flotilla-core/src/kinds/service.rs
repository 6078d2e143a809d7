//! Container service running a task definition on a cluster.

use super::{FieldSpec, KindSpec};

pub const SERVICE: KindSpec = KindSpec {
    kind: "service",
    scope_field: Some("cluster"),
    required: &[],
    fields: &[
        FieldSpec::reference("cluster", "cluster", "cluster"),
        FieldSpec::reference("task_definition", "taskDefinition", "task_definition"),
        FieldSpec::plain("load_balancers", "loadBalancers"),
        FieldSpec::plain("service_registries", "serviceRegistries"),
        FieldSpec::plain("desired_count", "desiredCount"),
        FieldSpec::plain("client_token", "clientToken"),
        FieldSpec::plain("launch_type", "launchType"),
        FieldSpec::plain("capacity_provider_strategy", "capacityProviderStrategy"),
        FieldSpec::plain("platform_version", "platformVersion"),
        FieldSpec::plain("role", "role"),
        FieldSpec::plain("deployment_configuration", "deploymentConfiguration"),
        FieldSpec::plain("placement_constraints", "placementConstraints"),
        FieldSpec::plain("placement_strategy", "placementStrategy"),
        FieldSpec::plain("network_configuration", "networkConfiguration"),
        FieldSpec::plain(
            "health_check_grace_period_seconds",
            "healthCheckGracePeriodSeconds",
        ),
        FieldSpec::plain("scheduling_strategy", "schedulingStrategy"),
        FieldSpec::plain("deployment_controller", "deploymentController"),
        FieldSpec::plain("tags", "tags"),
        FieldSpec::plain("enable_ecsmanaged_tags", "enableECSManagedTags"),
        FieldSpec::plain("propagate_tags", "propagateTags"),
        FieldSpec::plain("enable_execute_command", "enableExecuteCommand"),
    ],
};
