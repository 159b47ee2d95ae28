//! Built-in deployment job kinds

use stagehand_types::{FieldKind, FieldSpec, JobKind, SafetyPolicy, SchemaDescriptor};

pub const DEPLOY_PACK: &str = "deploy.pack";
pub const DEPLOY_MIGRATE: &str = "deploy.migrate";

/// Pack backend files for deployment. Idempotent.
pub fn deploy_pack_kind() -> JobKind {
    JobKind::new(DEPLOY_PACK, 120_000)
        .with_description("Pack backend files for deployment")
        .allow_partitioner("by_filesize")
        .allow_partitioner("by_key_range")
        .allow_executor("pack_backend")
        .with_safety_policy(SafetyPolicy::idempotent())
        .with_input_schema(
            SchemaDescriptor::any()
                .with_field(FieldSpec::required("items", FieldKind::Array))
                .with_field(FieldSpec::optional("chunk_size_bytes", FieldKind::Number)),
        )
        .with_output_schema(
            SchemaDescriptor::any()
                .with_field(FieldSpec::required("files_processed", FieldKind::Number))
                .with_field(FieldSpec::required("bytes_processed", FieldKind::Number)),
        )
}

/// Execute database migrations. Non-idempotent; real runs need a
/// certified dry run first.
pub fn deploy_migrate_kind() -> JobKind {
    JobKind::new(DEPLOY_MIGRATE, 300_000)
        .with_description("Execute database migrations")
        .allow_partitioner("by_key_range")
        .allow_executor("sql_migrate")
        .with_safety_policy(SafetyPolicy::guarded())
        .with_input_schema(
            SchemaDescriptor::any().with_field(FieldSpec::required("items", FieldKind::Array)),
        )
        .with_output_schema(
            SchemaDescriptor::any().with_field(FieldSpec::required("statements", FieldKind::Number)),
        )
}

pub fn builtin_kinds() -> Vec<JobKind> {
    vec![deploy_pack_kind(), deploy_migrate_kind()]
}
