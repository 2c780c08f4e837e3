//! Task definition generator
//!
//! Turns a batch plan into the task list: one file-processing task per work
//! unit, followed by the analysis, module and summary tasks that depend on
//! them.

use scribe_batch::{BatchPlan, BatchStrategy, WorkUnit};
use scribe_core::{
    Category, Dependency, ExpectedOutput, Milestone, ScribeConfig, Task, TaskInstructions,
    TaskKind, TaskPayload,
};
use scribe_validation::checklist_text;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Id of the architecture analysis task
pub const ANALYSIS_TASK_ID: &str = "analysis-architecture";

/// Id of the project summary task
pub const SUMMARY_TASK_ID: &str = "summary-project";

const ANALYSIS_PRIORITY: i32 = 30;
const MODULE_PRIORITY: i32 = 20;
const SUMMARY_PRIORITY: i32 = 10;

const SUMMARY_SECTIONS: [&str; 4] = ["overview", "architecture", "modules", "getting-started"];

/// Lowercase id fragment: ascii alphanumerics kept, runs of anything else
/// collapsed to a single `-`
fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    trimmed.chars().take(48).collect::<String>().trim_end_matches('-').to_string()
}

/// File name without directories or final extension
fn stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Path without its final extension, directories kept
fn without_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

/// Builds tasks from a batch plan
#[derive(Debug, Clone)]
pub struct TaskGenerator {
    config: ScribeConfig,
}

impl TaskGenerator {
    pub fn new(config: &ScribeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Generate the complete task list for `plan`
    ///
    /// Ids depend only on unit positions and file paths, so an unchanged
    /// plan yields the same ids on every run. An empty plan yields no tasks.
    #[instrument(skip(self, plan), fields(units = plan.units.len()))]
    pub fn generate(&self, plan: &BatchPlan) -> Vec<Task> {
        if plan.units.is_empty() {
            return Vec::new();
        }

        let mut tasks: Vec<Task> = plan.units.iter().map(|u| self.file_task(u)).collect();

        let mut by_category: BTreeMap<Category, Vec<String>> = BTreeMap::new();
        for unit in &plan.units {
            for entry in &unit.entries {
                let files = by_category.entry(entry.category).or_default();
                if !files.contains(&entry.path) {
                    files.push(entry.path.clone());
                }
            }
        }

        tasks.push(self.analysis_task(&by_category));
        let modules: Vec<Task> = by_category
            .iter()
            .map(|(category, files)| self.module_task(*category, files))
            .collect();
        let summary_dependency = if modules.is_empty() {
            Dependency::Task(ANALYSIS_TASK_ID.to_string())
        } else {
            Dependency::Milestone(Milestone::AllCompleted(TaskKind::ModuleCreation))
        };
        tasks.extend(modules);
        tasks.push(self.summary_task(summary_dependency));

        for (sequence, task) in tasks.iter_mut().enumerate() {
            task.sequence = sequence as u64;
        }

        info!(
            total = tasks.len(),
            file_tasks = plan.units.len(),
            "Generated tasks"
        );
        tasks
    }

    fn doc_path(&self, name: &str) -> String {
        format!(
            "{}/{}.{}",
            self.config.output.docs_dir.trim_end_matches('/'),
            name,
            self.config.output.extension
        )
    }

    fn file_task(&self, unit: &WorkUnit) -> Task {
        let files = unit.files();
        let first = files.first().map(String::as_str).unwrap_or(unit.id.as_str());
        let chunk = unit.chunk().cloned();

        let mut id = format!("fp-{:04}-{}", unit.index, slug(first));
        if let Some(chunk) = &chunk {
            id.push_str(&format!("-part{}", chunk.ordinal));
        }

        let title = match (&chunk, files.len()) {
            (Some(chunk), _) => format!("Document {} ({} of {})", first, chunk.ordinal, chunk.total),
            (None, 1) => format!("Document {}", first),
            (None, n) => format!("Document {} files: {}", n, files.join(", ")),
        };

        let priority = unit
            .entries
            .iter()
            .map(|e| self.config.priority_override(&e.path).unwrap_or(e.importance))
            .max()
            .unwrap_or(0);

        // Each chunk must produce its own document
        let part_suffix = chunk
            .as_ref()
            .map(|c| format!("-part{}", c.ordinal))
            .unwrap_or_default();

        let docs_dir = self.config.output.docs_dir.trim_end_matches('/');
        let ext = &self.config.output.extension;
        let expected: Vec<ExpectedOutput> = files
            .iter()
            .map(|f| {
                ExpectedOutput::Pattern(format!(
                    "{}/**/{}*{}.{}",
                    docs_dir,
                    stem(f),
                    part_suffix,
                    ext
                ))
            })
            .collect();
        let output_patterns: Vec<String> = files
            .iter()
            .map(|f| self.doc_path(&format!("{}{}", without_extension(f), part_suffix)))
            .collect();

        let mut focus_areas: Vec<String> = Vec::new();
        for entry in &unit.entries {
            for area in entry.category.focus_areas() {
                if !focus_areas.iter().any(|a| a == area) {
                    focus_areas.push(area.to_string());
                }
            }
        }

        let mut description = format!(
            "Write documentation for {} from {} ({} strategy, about {} tokens).",
            if files.len() == 1 { "one file" } else { "several files" },
            unit.id,
            unit.strategy,
            unit.estimated_tokens
        );
        if let Some(chunk) = &chunk {
            description.push_str(&format!(
                " This unit holds {} of the file; other chunks are separate tasks.",
                chunk
            ));
        }
        if unit.strategy == BatchStrategy::Single && unit.entries.iter().any(|e| e.trim.is_some()) {
            description.push_str(" The content was trimmed to fit; read the file for details.");
        }

        debug!(id = %id, priority, "File task");

        Task::new(
            id,
            title,
            TaskPayload::FileProcessing {
                batch_id: unit.id.clone(),
                files: files.clone(),
                chunk,
                estimated_tokens: unit.estimated_tokens,
            },
            Dependency::None,
        )
        .with_description(description)
        .with_priority(priority)
        .with_expected_outputs(expected)
        .with_instructions(TaskInstructions {
            target_files: files,
            output_patterns,
            focus_areas,
            checklist: checklist_text(TaskKind::FileProcessing, &self.config.validation),
        })
        .with_estimate(5 + (unit.estimated_tokens / 500) as u32)
    }

    fn analysis_task(&self, by_category: &BTreeMap<Category, Vec<String>>) -> Task {
        let output = self.doc_path("architecture");
        let target_files: Vec<String> = by_category.values().flatten().cloned().collect();

        Task::new(
            ANALYSIS_TASK_ID,
            "Analyze project architecture",
            TaskPayload::Analysis {
                scope: by_category.keys().copied().collect(),
            },
            Dependency::Milestone(Milestone::AllCompleted(TaskKind::FileProcessing)),
        )
        .with_description(
            "Describe how the documented files fit together: layers, data flow and \
             the main dependencies between modules.",
        )
        .with_priority(ANALYSIS_PRIORITY)
        .with_expected_outputs(vec![ExpectedOutput::Path(output.clone())])
        .with_instructions(TaskInstructions {
            target_files,
            output_patterns: vec![output],
            focus_areas: vec![
                "overall structure and layering".to_string(),
                "data flow between components".to_string(),
                "external dependencies".to_string(),
            ],
            checklist: checklist_text(TaskKind::Analysis, &self.config.validation),
        })
        .with_estimate(30)
    }

    fn module_task(&self, category: Category, files: &[String]) -> Task {
        let output = self.doc_path(&format!("modules/{}", category));

        Task::new(
            format!("module-{}", category),
            format!("Write the {} module page", category),
            TaskPayload::ModuleCreation {
                category,
                files: files.to_vec(),
            },
            Dependency::Task(ANALYSIS_TASK_ID.to_string()),
        )
        .with_description(format!(
            "Summarize the {} {} file(s) on one page, linking to their per-file documentation.",
            files.len(),
            category
        ))
        .with_priority(MODULE_PRIORITY)
        .with_expected_outputs(vec![ExpectedOutput::Path(output.clone())])
        .with_instructions(TaskInstructions {
            target_files: files.to_vec(),
            output_patterns: vec![output],
            focus_areas: category.focus_areas().iter().map(|a| a.to_string()).collect(),
            checklist: checklist_text(TaskKind::ModuleCreation, &self.config.validation),
        })
        .with_estimate(10 + 2 * files.len() as u32)
    }

    fn summary_task(&self, dependency: Dependency) -> Task {
        let output = self.doc_path("index");

        Task::new(
            SUMMARY_TASK_ID,
            "Write the project summary",
            TaskPayload::Summary {
                sections: SUMMARY_SECTIONS.iter().map(|s| s.to_string()).collect(),
            },
            dependency,
        )
        .with_description("Write the documentation index that introduces the project.")
        .with_priority(SUMMARY_PRIORITY)
        .with_expected_outputs(vec![ExpectedOutput::Path(output.clone())])
        .with_instructions(TaskInstructions {
            target_files: Vec::new(),
            output_patterns: vec![output],
            focus_areas: SUMMARY_SECTIONS.iter().map(|s| s.to_string()).collect(),
            checklist: checklist_text(TaskKind::Summary, &self.config.validation),
        })
        .with_estimate(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_batch::BatchBuilder;
    use scribe_core::{BudgetConfig, Language, SourceFile};

    fn source(path: &str, category: Category, importance: i32) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            size_bytes: 0,
            modified: None,
            category,
            language: Language::from_path(path).unwrap_or(Language::Rust),
            importance,
            depth: path.matches('/').count(),
        }
    }

    fn plan() -> BatchPlan {
        let builder = BatchBuilder::new(&BudgetConfig::default());
        let loaded = vec![
            (
                source("src/main.rs", Category::Entry, 80),
                "fn main() {}\n".to_string(),
            ),
            (
                source("src/services/user_service.rs", Category::Service, 60),
                "pub struct UserService;\n".to_string(),
            ),
        ];
        builder.assemble(2, loaded, Vec::new())
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("src/services/User_Service.rs"), "src-services-user-service-rs");
        assert_eq!(slug("./a//b"), "a-b");
    }

    #[test]
    fn test_without_extension() {
        assert_eq!(without_extension("src/lib.rs"), "src/lib");
        assert_eq!(without_extension("Makefile"), "Makefile");
        assert_eq!(without_extension("a.b/.env"), "a.b/.env");
    }

    #[test]
    fn test_generates_file_and_follow_on_tasks() {
        let tasks = TaskGenerator::new(&ScribeConfig::default()).generate(&plan());
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "fp-0001-src-main-rs",
                ANALYSIS_TASK_ID,
                "module-entry",
                "module-service",
                SUMMARY_TASK_ID,
            ]
        );
        assert!(tasks.iter().enumerate().all(|(i, t)| t.sequence == i as u64));

        let file_task = &tasks[0];
        assert_eq!(file_task.dependency, Dependency::None);
        assert_eq!(file_task.priority, 80);
        assert!(file_task
            .expected_outputs
            .iter()
            .any(|e| e.matches("docs/src/services/user_service.md")));

        assert_eq!(
            tasks[1].dependency,
            Dependency::Milestone(Milestone::AllCompleted(TaskKind::FileProcessing))
        );
        assert_eq!(tasks[2].dependency, Dependency::Task(ANALYSIS_TASK_ID.to_string()));
        assert_eq!(
            tasks[4].dependency,
            Dependency::Milestone(Milestone::AllCompleted(TaskKind::ModuleCreation))
        );
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let generator = TaskGenerator::new(&ScribeConfig::default());
        let first: Vec<String> = generator.generate(&plan()).into_iter().map(|t| t.id).collect();
        let second: Vec<String> = generator.generate(&plan()).into_iter().map(|t| t.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_priority_override_wins() {
        let mut config = ScribeConfig::default();
        config
            .priority_overrides
            .insert("src/services/user_service.rs".to_string(), 95);

        let tasks = TaskGenerator::new(&config).generate(&plan());
        assert_eq!(tasks[0].priority, 95);
    }

    #[test]
    fn test_chunk_tasks_expect_their_own_part() {
        let budget = BudgetConfig {
            chars_per_token: 4,
            target_batch_tokens: 1_000,
            max_batch_tokens: 2_000,
            target_file_tokens: 800,
            max_file_tokens: 1_500,
            ..BudgetConfig::default()
        };
        let plan = BatchBuilder::new(&budget).assemble(
            1,
            vec![(source("notes/big.txt", Category::Other, 50), "x".repeat(2_000 * 4))],
            Vec::new(),
        );
        let tasks = TaskGenerator::new(&ScribeConfig::default()).generate(&plan);
        let parts: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.kind() == TaskKind::FileProcessing)
            .collect();
        assert!(parts.len() >= 2);

        let first = &parts[0];
        let second = &parts[1];
        assert!(first.id.ends_with("-part1"));
        assert_eq!(first.instructions.output_patterns, vec!["docs/notes/big-part1.md"]);
        assert!(first.expected_outputs[0].matches("docs/notes/big-part1.md"));
        assert!(!second.expected_outputs[0].matches("docs/notes/big-part1.md"));
        assert!(second.expected_outputs[0].matches("docs/notes/big-part2.md"));
    }

    #[test]
    fn test_empty_plan_has_no_tasks() {
        let plan = BatchBuilder::new(&BudgetConfig::default()).assemble(0, Vec::new(), Vec::new());
        assert!(TaskGenerator::new(&ScribeConfig::default())
            .generate(&plan)
            .is_empty());
    }
}
