//! Task definition family. The resource name is the family.

use super::{FieldSpec, KindSpec};

pub const TASK_DEFINITION: KindSpec = KindSpec {
    kind: "task_definition",
    scope_field: None,
    required: &["container_definitions"],
    fields: &[
        FieldSpec::plain("container_definitions", "containerDefinitions"),
        FieldSpec::plain("task_role_arn", "taskRoleArn"),
        FieldSpec::plain("execution_role_arn", "executionRoleArn"),
        FieldSpec::plain("network_mode", "networkMode"),
        FieldSpec::plain("volumes", "volumes"),
        FieldSpec::plain("placement_constraints", "placementConstraints"),
        FieldSpec::plain("requires_compatibilities", "requiresCompatibilities"),
        FieldSpec::plain("cpu", "cpu"),
        FieldSpec::plain("memory", "memory"),
        FieldSpec::plain("tags", "tags"),
        FieldSpec::plain("pid_mode", "pidMode"),
        FieldSpec::plain("ipc_mode", "ipcMode"),
        FieldSpec::plain("proxy_configuration", "proxyConfiguration"),
        FieldSpec::plain("ephemeral_storage", "ephemeralStorage"),
        FieldSpec::plain("runtime_platform", "runtimePlatform"),
    ],
};
