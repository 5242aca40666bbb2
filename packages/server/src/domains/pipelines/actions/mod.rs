//! Built-in pipelines and the registry builder.

pub mod archive_stale_jobs;
pub mod daily_digest;
pub mod ingest_job;
pub mod prune_pipeline_runs;
pub mod score_jobs;
pub mod scrape_source;
pub mod sync_email_source;

pub use archive_stale_jobs::ArchiveStaleJobs;
pub use daily_digest::DailyDigest;
pub use ingest_job::IngestJob;
pub use prune_pipeline_runs::PrunePipelineRuns;
pub use score_jobs::ScoreJobs;
pub use scrape_source::ScrapeSourcePipeline;
pub use sync_email_source::SyncEmailSource;

use super::registry::PipelineRegistry;

/// Registry with every built-in pipeline.
pub fn build_pipeline_registry() -> PipelineRegistry {
    let mut registry = PipelineRegistry::new();
    registry
        .register(ScoreJobs)
        .register(IngestJob)
        .register(SyncEmailSource)
        .register(ScrapeSourcePipeline)
        .register(DailyDigest)
        .register(ArchiveStaleJobs)
        .register(PrunePipelineRuns);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = build_pipeline_registry();
        assert_eq!(
            registry.names(),
            vec![
                "archive_stale_jobs",
                "daily_digest",
                "ingest_job",
                "prune_pipeline_runs",
                "score_jobs",
                "scrape_source",
                "sync_email_source",
            ]
        );
    }

    #[test]
    fn test_builtin_flags() {
        let registry = build_pipeline_registry();
        let describe = registry.describe();
        let webhook: Vec<_> = describe.iter().filter(|d| d.webhook).map(|d| d.name).collect();
        assert_eq!(webhook, vec!["ingest_job", "sync_email_source"]);

        let hidden: Vec<_> = describe
            .iter()
            .filter(|d| !d.agent_tool)
            .map(|d| d.name)
            .collect();
        assert_eq!(hidden, vec!["prune_pipeline_runs"]);
    }

    #[test]
    fn test_input_schemas_are_objects() {
        for descriptor in build_pipeline_registry().describe() {
            assert_eq!(
                descriptor.input_schema["type"], "object",
                "{} input schema",
                descriptor.name
            );
            assert!(descriptor.input_schema.get("$schema").is_none());
        }
    }

    #[test]
    fn test_ingest_job_input_requires_title_and_company() {
        let registry = build_pipeline_registry();
        let ingest = registry.get("ingest_job").unwrap();
        assert!(ingest
            .validate(&serde_json::json!({"title": "Engineer", "company": "Acme"}))
            .is_ok());
        assert!(ingest
            .validate(&serde_json::json!({"title": "Engineer"}))
            .is_err());
    }
}
