//! Turns the stored sheets into the editor prompt and asks the model for the briefing.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write as _;

use crate::error::AppError;
use crate::llm::Summarizer;
use crate::sheets::{
    SheetStore, SheetTable, ValueInput, GOOGLE_NEWS_SHEET, SUMMARIES_SHEET, TOP_STORIES_SHEET, TRENDS_RISING_SHEET,
    TRENDS_TOP_SHEET,
};

const EDITOR_CONTEXT: &str = "You are a seasoned financial news editor for an Australian financial news publisher. \
Your responsibilities include analyzing financial data and news sources to identify key trends, notable events, \
and opportunities for in-depth reporting. You provide insightful summaries and detailed briefs to help financial \
journalists craft stories that inform and engage retail investors and industry professionals. Your communication \
style is clear, concise, and analytical, with a focus on accuracy and relevance. You use industry-specific \
terminology appropriately and maintain an objective tone.\n\n";

const RULE: &str = "--------------------------------------------------";

/// The four stored tables the briefing is written from.
#[derive(Debug, Clone, Default)]
pub struct BriefingData {
    pub news: SheetTable,
    pub top_stories: SheetTable,
    pub trends_rising: SheetTable,
    pub trends_top: SheetTable,
}

impl BriefingData {
    /// Read the tables back; a missing sheet fails the run like any other storage error.
    pub async fn load(store: &dyn SheetStore) -> Result<Self, AppError> {
        Ok(Self {
            news: read_required(store, GOOGLE_NEWS_SHEET).await?,
            top_stories: read_required(store, TOP_STORIES_SHEET).await?,
            trends_rising: read_required(store, TRENDS_RISING_SHEET).await?,
            trends_top: read_required(store, TRENDS_TOP_SHEET).await?,
        })
    }
}

async fn read_required(store: &dyn SheetStore, name: &str) -> Result<SheetTable, AppError> {
    store
        .read_table(name)
        .await?
        .ok_or_else(|| AppError::StorageError(format!("worksheet '{}' not found", name)))
}

fn push_articles(out: &mut String, heading: &str, table: &SheetTable) {
    let _ = writeln!(out, "{}", heading);
    for row in &table.rows {
        let _ = writeln!(
            out,
            "- Title: {}, Link: {}, Snippet: {}",
            table.cell(row, "Title"),
            table.cell(row, "Link"),
            table.cell(row, "Snippet")
        );
    }
}

fn push_queries(out: &mut String, heading: &str, table: &SheetTable) {
    let _ = writeln!(out, "{}", heading);
    for row in &table.rows {
        let _ = writeln!(
            out,
            "- Query: {}, Value: {}",
            table.cell(row, "Query"),
            table.cell(row, "Value")
        );
    }
}

/// Serialize the four tables into the plain-text data block of the prompt.
pub fn format_data_for_prompt(data: &BriefingData) -> String {
    let mut out = String::new();
    push_articles(&mut out, "Google News Data:", &data.news);
    out.push('\n');
    push_articles(&mut out, "Top Stories Data:", &data.top_stories);
    out.push('\n');
    push_queries(&mut out, "Google Trends Rising Data:", &data.trends_rising);
    out.push('\n');
    push_queries(&mut out, "Google Trends Top Data:", &data.trends_top);
    out
}

/// Full single-message prompt. `date` is the local calendar date shown in the report.
pub fn build_prompt(formatted_data: &str, date: &str) -> String {
    let mut instructions = String::new();
    let _ = write!(
        instructions,
        "As a news editor for an Australian financial news publisher, your task is to analyze and summarize the latest \
data from various sources related to the Australian stock market. Your goal is to identify key trends, recurring \
themes, and interesting opportunities for our financial journalists to cover.\n\n\
Using the provided data, please perform the following tasks:\n\
1. Analyze the \"Google Trends Rising\" data to identify the top 10 rising search queries, paying special attention \
to high-volume queries and those marked as 'Breakout'.\n\
2. Analyze the \"Google Trends Top\" data to identify the top search queries.\n\
3. Review the articles from \"Google News\" to identify recurring themes and notable entities.\n\
4. Review the articles from \"Top Stories\" for the query \"ASX 200\" to identify significant news stories.\n\n\
Please include the following sections in your report using plain text with single asterisks (*) for bold text. \
Use lines of hyphens (\"-\" repeated) to create horizontal lines as separators before and after major sections and \
brief titles. Do not use Markdown headers or `###`.\n\n\
Include the date of summarization ({date}) in your report.\n\n\
The report should have the following structure:\n\n\
{RULE}\n*Summary of Findings [{date}]*\n{RULE}\n\
*Google Trends Insights*: List the top 10 trends from the \"Google Trends Rising\" data, along with their volumes.\n\n\
*Key Trends & Recurring Themes*: Identify the top 5 trends with brief descriptions and their volumes.\n\n\
*Notable Entities*: List key companies, institutions, and market insights discussed in the data.\n\n\
{RULE}\n*5 Detailed Briefs for Journalists*\n{RULE}\n\n\
For each brief, use the following structure, separated by horizontal lines:\n\n\
{RULE}\n*Brief Title*\n{RULE}\n\
1. *Synopsis*: Brief summary of the findings.\n\
2. *Key Themes*: Main themes identified in the data.\n\
3. *Entities*: Relevant companies, indexes, or key individuals.\n\
4. *Source Insights*: Data sources these insights come from.\n\
5. *Suggested Angles*: Recommended angles for journalists to pursue.\n\n\
Include emojis at the beginning of important sections to visually highlight them. \
Do not use Markdown headers or `###`.\n"
    );

    format!(
        "{}{}\nHere is the data to analyze:\n\n{}",
        EDITOR_CONTEXT, instructions, formatted_data
    )
}

/// Read the stored data, ask the model for a briefing and log it to the summaries sheet.
#[tracing::instrument(skip_all)]
pub async fn generate_summary(
    store: &dyn SheetStore,
    summarizer: &dyn Summarizer,
    now: DateTime<Utc>,
    display_tz: Tz,
) -> Result<String, AppError> {
    let data = BriefingData::load(store).await?;
    let formatted = format_data_for_prompt(&data);
    let date = now.with_timezone(&display_tz).format("%Y-%m-%d").to_string();
    let prompt = build_prompt(&formatted, &date);
    tracing::debug!("Prompt is {} chars", prompt.len());

    let summary = summarizer.complete(&prompt).await?;
    tracing::info!("Received summary ({} chars)", summary.len());

    // Summaries open with a row of hyphens, which USER_ENTERED would parse as a formula
    store
        .append_row(SUMMARIES_SHEET, vec![summary.clone()], ValueInput::Raw)
        .await?;
    Ok(summary)
}
