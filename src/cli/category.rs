//! today category command implementation

use serde::Serialize;

use crate::cli::context::{Context, Globals};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::task::Category;

pub struct AddOptions {
    pub title: String,
    pub globals: Globals,
}

pub struct RmOptions {
    pub category: String,
    pub globals: Globals,
}

#[derive(Serialize)]
struct CategoryEntry {
    #[serde(flatten)]
    category: Category,
    tasks: usize,
}

#[derive(Serialize)]
struct CategoryList {
    categories: Vec<CategoryEntry>,
}

#[derive(Serialize)]
struct RemoveReport {
    category: Category,
    tasks_updated: usize,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let category = ctx.planner.add_category(&options.title)?;
    ctx.planner.save()?;

    let mut human = HumanOutput::new(format!("Added category {}", category.title));
    human.push_summary("id", category.id.to_string());
    ctx.finish(&mut human);
    emit_success(ctx.output, "category add", &category, Some(&human))
}

pub fn run_list(globals: Globals) -> Result<()> {
    let ctx = Context::load(&globals)?;
    let working = ctx.planner.working();

    let mut categories: Vec<CategoryEntry> = working
        .categories()
        .iter()
        .map(|category| CategoryEntry {
            category: category.clone(),
            tasks: working
                .tasks()
                .iter()
                .filter(|task| task.categories.contains(&category.id))
                .count(),
        })
        .collect();
    categories.sort_by(|a, b| {
        a.category
            .title
            .to_lowercase()
            .cmp(&b.category.title.to_lowercase())
    });

    let mut human = HumanOutput::new(format!("{} categor(ies)", categories.len()));
    for entry in &categories {
        human.push_detail(format!(
            "{} ({} task(s))  {}",
            entry.category.title, entry.tasks, entry.category.id
        ));
    }
    emit_success(ctx.output, "category ls", &CategoryList { categories }, Some(&human))
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let working = ctx.planner.working();
    let tasks_updated = working
        .categories()
        .iter()
        .find(|category| {
            category.id.to_string() == options.category
                || category.title.eq_ignore_ascii_case(&options.category)
        })
        .map(|category| {
            working
                .tasks()
                .iter()
                .filter(|task| task.categories.contains(&category.id))
                .count()
        })
        .unwrap_or(0);
    let category = ctx.planner.remove_category(&options.category)?;
    ctx.planner.save()?;

    let mut human = HumanOutput::new(format!("Removed category {}", category.title));
    human.push_summary("tasks updated", tasks_updated.to_string());
    ctx.finish(&mut human);
    let report = RemoveReport {
        category,
        tasks_updated,
    };
    emit_success(ctx.output, "category rm", &report, Some(&human))
}
