//! Prompt rendering for the LLM rewrite steps.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

const LLMMIG_TEMPLATE: &str = include_str!("prompts/llmmig.md");
const ASYNC_TRANSFORM_TEMPLATE: &str = include_str!("prompts/async_transform.md");

/// System message for every rewrite request.
pub const SYSTEM_PROMPT: &str = "You are an expert Python developer performing \
precise library-to-library API migrations. You respond with complete source \
files and never with partial snippets or commentary.";

/// Inputs for rendering one per-file prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub path: &'a str,
    pub content: &'a str,
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub content: String,
    /// True when the file content was cut to fit the byte budget.
    pub truncated: bool,
}

/// Renders prompt templates within a file-content byte budget.
///
/// Oversized files are truncated head-first (imports and early definitions
/// carry the migration-relevant API usage) and the prompt says so, rather
/// than silently feeding the model a clipped file.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_llmmig(&self, input: &PromptInputs<'_>) -> Result<RenderedPrompt> {
        self.render("llmmig", LLMMIG_TEMPLATE, input)
    }

    pub fn build_async_transform(&self, input: &PromptInputs<'_>) -> Result<RenderedPrompt> {
        self.render("async_transform", ASYNC_TRANSFORM_TEMPLATE, input)
    }

    fn render(
        &self,
        name: &'static str,
        template: &'static str,
        input: &PromptInputs<'_>,
    ) -> Result<RenderedPrompt> {
        let (content, truncated) = budget_content(input.content, self.budget_bytes);
        if truncated {
            debug!(
                path = input.path,
                budget_bytes = self.budget_bytes,
                "truncated file content for prompt budget"
            );
        }

        let mut env = Environment::new();
        env.add_template(name, template)
            .expect("bundled template should be valid");
        let rendered = env
            .get_template(name)
            .expect("template was just added")
            .render(context! {
                source => input.source,
                target => input.target,
                path => input.path,
                content => content,
                truncated => truncated,
            })
            .with_context(|| format!("render {name} prompt for {}", input.path))?;

        Ok(RenderedPrompt {
            content: rendered,
            truncated,
        })
    }
}

/// Cut `content` to at most `budget` bytes on a line boundary.
fn budget_content(content: &str, budget: usize) -> (String, bool) {
    if content.len() <= budget {
        return (content.to_string(), false);
    }
    let mut kept = String::new();
    for line in content.lines() {
        if kept.len() + line.len() + 1 > budget {
            break;
        }
        kept.push_str(line);
        kept.push('\n');
    }
    (kept, true)
}
