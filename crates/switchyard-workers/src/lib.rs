pub mod fanout;
pub mod llm;
pub mod math;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use switchyard_agent::{WorkerAdapter, WorkerRegistry};
use switchyard_core::config::{AppConfig, WorkerConfig, WorkerKind};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{LlmClient, Worker};

pub use fanout::{FanOutWorker, HttpSource, Source};
pub use llm::LlmWorker;
pub use math::MathWorker;

/// Build the worker registry from the `[[workers]]` table.
///
/// `llm` serves every `llm` worker without its own model override.
pub fn build_registry(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<WorkerRegistry> {
    let mut registry = WorkerRegistry::new();

    for wc in &config.workers {
        let worker = build_worker(config, wc, &llm)?;
        registry.register(WorkerAdapter::from_arc(worker, wc.after))?;
    }

    info!(workers = ?registry.names(), "Worker registry built");
    Ok(registry)
}

fn build_worker(
    config: &AppConfig,
    wc: &WorkerConfig,
    shared_llm: &Arc<dyn LlmClient>,
) -> Result<Arc<dyn Worker>> {
    match wc.kind {
        WorkerKind::Math => Ok(Arc::new(MathWorker::new(&wc.name, &wc.description))),
        WorkerKind::Llm => {
            let (client, model) = match &wc.model {
                Some(model) => {
                    let client: Arc<dyn LlmClient> =
                        Arc::from(switchyard_llm::create_client(model)?);
                    (client, model.clone())
                }
                None => (shared_llm.clone(), config.model.clone()),
            };
            let prompt = wc.system_prompt.clone().unwrap_or_else(|| {
                format!(
                    "You are {}, a specialist. {} Answer the user's latest request directly.",
                    wc.name, wc.description
                )
            });
            Ok(Arc::new(LlmWorker::new(
                &wc.name,
                &wc.description,
                prompt,
                client,
                model,
            )))
        }
        WorkerKind::Fanout => {
            if wc.sources.is_empty() {
                return Err(SwitchyardError::Config(format!(
                    "fanout worker '{}' has no sources",
                    wc.name
                )));
            }
            let http = reqwest::Client::new();
            let sources = wc
                .sources
                .iter()
                .map(|s| {
                    Arc::new(HttpSource::new(http.clone(), &s.name, &s.url, wc.max_chars))
                        as Arc<dyn Source>
                })
                .collect();
            Ok(Arc::new(FanOutWorker::new(
                &wc.name,
                &wc.description,
                sources,
                Duration::from_secs(wc.timeout_secs),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::config::AfterRun;
    use switchyard_test_utils::ScriptedLlm;

    fn config(workers: &str) -> AppConfig {
        AppConfig::parse(&format!("[model]\nmodel_id = \"m\"\n{}", workers)).unwrap()
    }

    #[test]
    fn test_build_registry_from_config() {
        let cfg = config(
            r#"
[[workers]]
name = "math_agent"
description = "Arithmetic"
kind = "math"

[[workers]]
name = "weather_agent"
description = "Weather questions"
kind = "llm"

[[workers]]
name = "flight_search_agent"
description = "Flight lookups"
kind = "fanout"
after = "finish"

[[workers.sources]]
name = "ixigo"
url = "https://example.test/ixigo?q={query}"
"#,
        );
        let registry = build_registry(&cfg, Arc::new(ScriptedLlm::always("ok"))).unwrap();

        assert_eq!(
            registry.names(),
            vec!["math_agent", "weather_agent", "flight_search_agent"]
        );
        assert_eq!(
            registry.get("flight_search_agent").unwrap().after(),
            AfterRun::Finish
        );
        assert_eq!(registry.get("math_agent").unwrap().after(), AfterRun::Router);
    }

    #[test]
    fn test_duplicate_worker_names_rejected() {
        let cfg = config(
            r#"
[[workers]]
name = "math_agent"
description = "a"
kind = "math"

[[workers]]
name = "math_agent"
description = "b"
kind = "math"
"#,
        );
        assert!(matches!(
            build_registry(&cfg, Arc::new(ScriptedLlm::always("ok"))),
            Err(SwitchyardError::DuplicateWorker(_))
        ));
    }

    #[test]
    fn test_reserved_name_and_empty_fanout_rejected() {
        let reserved = config(
            "[[workers]]\nname = \"finish\"\ndescription = \"x\"\nkind = \"math\"\n",
        );
        assert!(matches!(
            build_registry(&reserved, Arc::new(ScriptedLlm::always("ok"))),
            Err(SwitchyardError::Config(_))
        ));

        let empty = config(
            "[[workers]]\nname = \"flights\"\ndescription = \"x\"\nkind = \"fanout\"\n",
        );
        assert!(matches!(
            build_registry(&empty, Arc::new(ScriptedLlm::always("ok"))),
            Err(SwitchyardError::Config(_))
        ));
    }
}
