use std::path::PathBuf;
use std::sync::Arc;
use treadle::Workflow;

use crate::config::Config;
use crate::generate::PipelineOptions;
use crate::openai::OpenAiEmbedder;
use crate::provider::EmbeddingProvider;
use crate::resilience::StopSignal;
use crate::{EmbedStage, ImportStage};

/// Build the import + embed pipeline against the configured provider.
///
/// # Errors
/// Returns an error if the provider client cannot be created or the
/// workflow cannot be built.
pub fn build_pipeline(
    source: PathBuf,
    db_path: PathBuf,
    config: &Config,
    stop: StopSignal,
) -> treadle::Result<Workflow> {
    let provider = config
        .provider_settings()
        .and_then(OpenAiEmbedder::new)
        .map_err(|e| {
            treadle::TreadleError::InvalidWorkflow(format!("Failed to create embed stage: {e}"))
        })?;

    build_pipeline_with_provider(
        source,
        db_path,
        Arc::new(provider),
        config.pipeline_options(),
        stop,
    )
}

/// Build the import + embed pipeline with an explicit provider.
///
/// # Errors
/// Returns an error if the workflow cannot be built.
pub fn build_pipeline_with_provider(
    source: PathBuf,
    db_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    options: PipelineOptions,
    stop: StopSignal,
) -> treadle::Result<Workflow> {
    let import_stage = ImportStage::new(source, db_path.clone());
    let embed_stage = EmbedStage::new(provider, options, db_path, stop);

    Workflow::builder()
        .stage("import", import_stage)
        .stage("embed", embed_stage)
        .dependency("embed", "import")
        .build()
}
