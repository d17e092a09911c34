//! Pluggable task executor strategies
//!
//! One strategy per agent type (interview, generation, refinement, validator,
//! export). Strategies coordinate: they emit agent events, call the
//! [`AgentBackend`] collaborator for the model-backed work, persist page
//! versions through the services, and return a result map recorded on the
//! task. The backend itself - prompts, providers, files - lives outside this
//! crate.

use crate::db::models::{EventSource, Task, VersionSource};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventType};
use crate::services::page::{NewPage, PageService, PageVersionService};
use crate::services::task::{TaskService, TaskUpdate};
use crate::{OrchestratorError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// One prior conversation turn
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// A page produced by the generation backend
#[derive(Debug, Clone)]
pub struct GeneratedPage {
    pub slug: String,
    pub title: String,
    pub html: String,
}

/// Collaborator contract for the model-backed work behind task strategies
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Clarify requirements; returns `{message, is_complete, context, ...}`
    async fn interview(
        &self,
        requirements: &str,
        history: &[ChatTurn],
    ) -> Result<serde_json::Value>;

    /// Produce one page for the given requirements
    async fn generate_page(&self, requirements: &str) -> Result<GeneratedPage>;

    /// Rework existing HTML according to the instructions
    async fn refine_page(&self, instructions: &str, current_html: &str) -> Result<String>;

    /// Validate HTML; returns the list of findings (empty = valid)
    async fn validate_html(&self, html: &str) -> Result<Vec<String>>;

    /// Export the session artifact; returns a summary map
    async fn export(&self, session_id: &str, output_dir: &str) -> Result<serde_json::Value>;
}

/// Shared context handed to every task execution
#[derive(Clone)]
pub struct ExecutionContext {
    pub pool: DatabasePool,
    pub session_id: String,
    pub output_dir: String,
    pub user_message: String,
    pub plan_goal: String,
    pub history: Vec<ChatTurn>,
    pub agents: Arc<dyn AgentBackend>,
    pub task_lookup: HashMap<String, Task>,
}

impl ExecutionContext {
    pub fn task_service(&self) -> TaskService {
        TaskService::new(self.pool.clone())
    }

    /// Parsed result maps of the task's completed dependencies
    pub fn dependency_results(&self, task: &Task) -> Vec<serde_json::Value> {
        task.dependency_ids()
            .iter()
            .filter_map(|dep_id| self.task_lookup.get(dep_id))
            .filter_map(|dep| dep.result.as_deref())
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// Assemble the requirements text for a task from its description, its
    /// dependencies' context, and recent history
    pub fn build_requirements(&self, task: &Task) -> String {
        let mut parts = Vec::new();

        let base = task
            .description
            .clone()
            .filter(|text| !text.is_empty())
            .or_else(|| Some(self.plan_goal.clone()).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| self.user_message.clone());
        if !base.is_empty() {
            parts.push(base);
        }

        for dep_result in self.dependency_results(task) {
            if let Some(context) = dep_result.get("context").and_then(|value| value.as_str()) {
                parts.push(format!("Dependency context: {context}"));
            }
            if let Some(message) = dep_result.get("message").and_then(|value| value.as_str()) {
                parts.push(format!("Dependency summary: {message}"));
            }
        }

        if !self.history.is_empty() {
            let recent: Vec<String> = self
                .history
                .iter()
                .rev()
                .take(10)
                .rev()
                .filter(|turn| !turn.content.is_empty())
                .map(|turn| format!("{}: {}", turn.role, turn.content))
                .collect();
            if !recent.is_empty() {
                parts.push(format!("Conversation history:\n{}", recent.join("\n")));
            }
        }

        parts.join("\n\n")
    }
}

/// Strategy contract: run one task to a result map
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn agent_type_label(&self) -> &'static str;

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value>;
}

fn agent_id(label: &str, task: &Task) -> String {
    format!("{}_{}", label.to_lowercase(), task.id)
}

async fn emit_agent_start(emitter: &EventEmitter, task: &Task, label: &str) {
    emitter
        .emit_from(
            EventType::AgentStart,
            json!({
                "task_id": task.id,
                "agent_id": agent_id(label, task),
                "agent_type": label,
            }),
            EventSource::Task,
        )
        .await;
}

async fn emit_agent_end(emitter: &EventEmitter, task: &Task, label: &str, summary: &str) {
    emitter
        .emit_from(
            EventType::AgentEnd,
            json!({
                "task_id": task.id,
                "agent_id": agent_id(label, task),
                "status": "success",
                "summary": summary,
            }),
            EventSource::Task,
        )
        .await;
}

async fn emit_task_progress(
    emitter: &EventEmitter,
    context: &ExecutionContext,
    task: &Task,
    progress: i64,
    message: &str,
) {
    emitter
        .emit_from(
            EventType::TaskProgress,
            json!({"task_id": task.id, "progress": progress, "message": message}),
            EventSource::Task,
        )
        .await;
    if let Err(error) = context
        .task_service()
        .set_status(
            &task.id,
            crate::db::models::TaskStatus::InProgress,
            TaskUpdate {
                progress: Some(progress),
                ..Default::default()
            },
        )
        .await
    {
        tracing::warn!(task_id = %task.id, %error, "failed to persist task progress");
    }
}

/// Interview strategy: clarifies requirements before generation
pub struct InterviewTaskExecutor;

#[async_trait]
impl TaskExecutor for InterviewTaskExecutor {
    fn agent_type_label(&self) -> &'static str {
        "Interview"
    }

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        emit_agent_start(emitter, task, self.agent_type_label()).await;

        let requirements = context.build_requirements(task);
        let result = context
            .agents
            .interview(&requirements, &context.history)
            .await?;

        let summary = result
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or("interview complete")
            .to_string();
        emit_agent_end(emitter, task, self.agent_type_label(), &summary).await;
        Ok(result)
    }
}

/// Generation strategy: produce a page and persist it as a new version
pub struct GenerationTaskExecutor;

#[async_trait]
impl TaskExecutor for GenerationTaskExecutor {
    fn agent_type_label(&self) -> &'static str {
        "Generation"
    }

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        emit_agent_start(emitter, task, self.agent_type_label()).await;
        emit_task_progress(emitter, context, task, 30, "Generating page").await;

        let requirements = context.build_requirements(task);
        let generated = context.agents.generate_page(&requirements).await?;

        let page_service = PageService::new(context.pool.clone());
        let page = match crate::db::repositories::PageRepository::get_by_slug(
            &context.pool,
            &context.session_id,
            &generated.slug,
        )
        .await?
        {
            Some(existing) => existing,
            None => {
                let order_index = page_service.list_pages(&context.session_id).await?.len() as i64;
                page_service
                    .create_page(
                        &context.session_id,
                        NewPage {
                            title: generated.title.clone(),
                            slug: generated.slug.clone(),
                            description: String::new(),
                            order_index,
                        },
                    )
                    .await?
            }
        };

        emit_task_progress(emitter, context, task, 80, "Persisting page version").await;
        let version = PageVersionService::new(context.pool.clone())
            .create_version(
                &page.id,
                &generated.html,
                VersionSource::Auto,
                Some(&task.title),
            )
            .await?;

        emit_agent_end(emitter, task, self.agent_type_label(), "page generated").await;
        Ok(json!({
            "page_id": page.id,
            "slug": page.slug,
            "version_id": version.id,
            "version": version.version,
        }))
    }
}

/// Refinement strategy: rework the current version of a page
pub struct RefinementTaskExecutor;

#[async_trait]
impl TaskExecutor for RefinementTaskExecutor {
    fn agent_type_label(&self) -> &'static str {
        "Refinement"
    }

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        emit_agent_start(emitter, task, self.agent_type_label()).await;

        let (page, current) = resolve_target_page(context, task).await?;
        let current_html = current.html.unwrap_or_default();

        let instructions = context.build_requirements(task);
        let refined = context
            .agents
            .refine_page(&instructions, &current_html)
            .await?;

        let version = PageVersionService::new(context.pool.clone())
            .create_version(&page.id, &refined, VersionSource::Auto, Some(&task.title))
            .await?;

        emit_agent_end(emitter, task, self.agent_type_label(), "page refined").await;
        Ok(json!({
            "page_id": page.id,
            "slug": page.slug,
            "version_id": version.id,
            "version": version.version,
        }))
    }
}

/// Validator strategy: fail the task when the current page HTML is invalid
pub struct ValidatorTaskExecutor;

#[async_trait]
impl TaskExecutor for ValidatorTaskExecutor {
    fn agent_type_label(&self) -> &'static str {
        "Validator"
    }

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        emit_agent_start(emitter, task, self.agent_type_label()).await;

        let (_, current) = resolve_target_page(context, task).await?;
        let errors = context
            .agents
            .validate_html(&current.html.unwrap_or_default())
            .await?;
        if !errors.is_empty() {
            return Err(OrchestratorError::General(format!(
                "Validation failed: {}",
                errors.join(", ")
            )));
        }

        emit_agent_end(emitter, task, self.agent_type_label(), "validation passed").await;
        Ok(json!({"valid": true, "errors": []}))
    }
}

/// Export strategy: hand the session artifact to the export collaborator
pub struct ExportTaskExecutor;

#[async_trait]
impl TaskExecutor for ExportTaskExecutor {
    fn agent_type_label(&self) -> &'static str {
        "Export"
    }

    async fn execute(
        &self,
        task: &Task,
        emitter: &EventEmitter,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        emit_agent_start(emitter, task, self.agent_type_label()).await;
        let result = context
            .agents
            .export(&context.session_id, &context.output_dir)
            .await?;
        emit_agent_end(emitter, task, self.agent_type_label(), "export complete").await;
        Ok(result)
    }
}

/// The page a refinement/validation task targets: the slug named in its
/// description, falling back to the session's first page
async fn resolve_target_page(
    context: &ExecutionContext,
    task: &Task,
) -> Result<(crate::db::models::Page, crate::db::models::PageVersion)> {
    let pages = PageService::new(context.pool.clone())
        .list_pages(&context.session_id)
        .await?;
    if pages.is_empty() {
        return Err(OrchestratorError::Validation(
            "No pages available".to_string(),
        ));
    }

    let description = task.description.clone().unwrap_or_default();
    let page = pages
        .iter()
        .find(|page| description.contains(&page.slug))
        .unwrap_or(&pages[0])
        .clone();

    let current = PageVersionService::new(context.pool.clone())
        .get_current(&page.id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("Page has no versions".to_string()))?;
    Ok((page, current))
}

/// Maps agent types to executor strategies
pub struct TaskExecutorFactory;

impl TaskExecutorFactory {
    /// Resolve a strategy; the default agent type is `generation`
    pub fn create(agent_type: Option<&str>) -> Result<Box<dyn TaskExecutor>> {
        let resolved = agent_type.unwrap_or("generation").trim().to_lowercase();
        match resolved.as_str() {
            "interview" => Ok(Box::new(InterviewTaskExecutor)),
            "generation" => Ok(Box::new(GenerationTaskExecutor)),
            "refinement" => Ok(Box::new(RefinementTaskExecutor)),
            "validator" => Ok(Box::new(ValidatorTaskExecutor)),
            "export" => Ok(Box::new(ExportTaskExecutor)),
            other => Err(OrchestratorError::Validation(format!(
                "Unknown agent type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::now_rfc3339;

    #[test]
    fn test_factory_known_types() {
        for agent_type in ["interview", "generation", "refinement", "validator", "export"] {
            assert!(TaskExecutorFactory::create(Some(agent_type)).is_ok());
        }
        assert_eq!(
            TaskExecutorFactory::create(None).unwrap().agent_type_label(),
            "Generation"
        );
        assert!(TaskExecutorFactory::create(Some("poet")).is_err());
    }

    #[test]
    fn test_build_requirements_prefers_description() {
        let context = ExecutionContext {
            pool: sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect_lazy("sqlite::memory:")
                .unwrap(),
            session_id: "s1".to_string(),
            output_dir: "/tmp/out".to_string(),
            user_message: "make a store".to_string(),
            plan_goal: "build storefront".to_string(),
            history: vec![ChatTurn {
                role: "user".to_string(),
                content: "dark theme please".to_string(),
            }],
            agents: Arc::new(PanicBackend),
            task_lookup: HashMap::new(),
        };

        let task = Task {
            id: "t1".to_string(),
            plan_id: "p1".to_string(),
            title: "gen".to_string(),
            description: Some("generate the checkout page".to_string()),
            agent_type: None,
            status: "pending".to_string(),
            progress: 0,
            depends_on: None,
            can_parallel: true,
            retry_count: 0,
            error_message: None,
            result: None,
            started_at: None,
            completed_at: None,
            created_at: now_rfc3339(),
        };

        let requirements = context.build_requirements(&task);
        assert!(requirements.starts_with("generate the checkout page"));
        assert!(requirements.contains("dark theme please"));
    }

    struct PanicBackend;

    #[async_trait]
    impl AgentBackend for PanicBackend {
        async fn interview(&self, _: &str, _: &[ChatTurn]) -> Result<serde_json::Value> {
            unreachable!()
        }
        async fn generate_page(&self, _: &str) -> Result<GeneratedPage> {
            unreachable!()
        }
        async fn refine_page(&self, _: &str, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn validate_html(&self, _: &str) -> Result<Vec<String>> {
            unreachable!()
        }
        async fn export(&self, _: &str, _: &str) -> Result<serde_json::Value> {
            unreachable!()
        }
    }
}
