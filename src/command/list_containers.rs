use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};

use crate::error::EXIT_OK;
use crate::workflow::{self, SessionInfo};

use super::{Boundaries, load_project};

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "SANDBOX")]
    sandbox: String,
    #[tabled(rename = "WORK ITEM")]
    work_item: String,
    #[tabled(rename = "BRANCH")]
    branch: String,
    #[tabled(rename = "CLAIMED")]
    claimed: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

impl From<SessionInfo> for SessionRow {
    fn from(info: SessionInfo) -> Self {
        let dash = || "-".to_string();
        Self {
            sandbox: info.sandbox,
            work_item: info.work_item_id.unwrap_or_else(dash),
            branch: info.branch.unwrap_or_else(dash),
            claimed: info
                .claimed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(dash),
            status: info.status,
        }
    }
}

fn render_table(sessions: Vec<SessionInfo>) -> String {
    let rows: Vec<SessionRow> = sessions.into_iter().map(SessionRow::from).collect();
    let mut table = Table::new(rows);
    table
        .with(Style::blank())
        .modify(Columns::new(0..5), Padding::new(0, 1, 0, 0));
    table.to_string()
}

pub fn run(json: bool) -> Result<i32> {
    let (project, config) = load_project()?;
    let boundaries = Boundaries::new(&config);
    let ctx = boundaries.context(&project, &config);
    let sessions = workflow::list_sessions(&ctx)?;

    if json {
        let out =
            serde_json::to_string_pretty(&sessions).context("Failed to serialize session list")?;
        println!("{}", out);
        return Ok(EXIT_OK);
    }

    if sessions.is_empty() {
        println!("No active work sessions");
        return Ok(EXIT_OK);
    }
    println!("{}", render_table(sessions));
    Ok(EXIT_OK)
}
