//! 批次摘要 - 业务能力层
//!
//! 纯函数：由一组分析结果生成文字摘要，以及最近批次的分类/优先级分布。
//! 输入先按工单 ID 排序，所以结果与并发完成顺序无关。

use std::fmt::{self, Write};

use crate::models::{Category, DistributionEntry, Priority, StoredAnalysis, TicketAnalysis, TicketsSummary};

/// 没有任何分析结果时的摘要
pub const EMPTY_SUMMARY: &str = "No tickets analyzed.";

const MAX_CATEGORIES: usize = 5;
const MAX_EXCERPTS: usize = 5;
const SHOWN_EXCERPTS: usize = 3;
const EXCERPT_FALLBACK_CHARS: usize = 80;

/// 生成批次摘要
///
/// 同一组结果（不论顺序）总是得到完全相同的文本
pub fn build_summary(results: &[TicketAnalysis]) -> Result<String, fmt::Error> {
    if results.is_empty() {
        return Ok(EMPTY_SUMMARY.to_string());
    }

    let mut ordered: Vec<&TicketAnalysis> = results.iter().collect();
    ordered.sort_by(|a, b| {
        a.ticket_id
            .cmp(&b.ticket_id)
            .then_with(|| a.analysis.cmp(&b.analysis))
    });

    let total = ordered.len();
    let mut summary = String::new();

    write!(summary, "Analyzed {} support ticket{}.", total, plural(total))?;

    // 分类分布：按数量降序，数量相同时保持首次出现的顺序
    let mut category_counts: Vec<(Category, usize)> = Vec::new();
    for result in &ordered {
        match category_counts.iter_mut().find(|(c, _)| *c == result.category) {
            Some((_, count)) => *count += 1,
            None => category_counts.push((result.category, 1)),
        }
    }
    category_counts.sort_by(|a, b| b.1.cmp(&a.1));

    let categories: Vec<String> = category_counts
        .iter()
        .take(MAX_CATEGORIES)
        .map(|(category, count)| {
            format!("{} {} ({:.0}%)", count, category.label(), percent(*count, total))
        })
        .collect();
    write!(summary, " Categories: {}.", categories.join(", "))?;

    // 优先级分布：固定 high → medium → low，省略数量为 0 的项
    let priorities: Vec<String> = Priority::DISPLAY_ORDER
        .iter()
        .filter_map(|priority| {
            let count = ordered.iter().filter(|r| r.priority == *priority).count();
            (count > 0).then(|| {
                format!(
                    "{} {}-priority ({:.0}%)",
                    count,
                    priority.as_str(),
                    percent(count, total)
                )
            })
        })
        .collect();
    if !priorities.is_empty() {
        write!(summary, " Priority breakdown: {}.", priorities.join(", "))?;
    }

    let excerpts = collect_excerpts(&ordered);
    if !excerpts.is_empty() {
        let issues = if excerpts.len() > SHOWN_EXCERPTS {
            format!(
                "{}; +{} more",
                excerpts[..SHOWN_EXCERPTS].join("; "),
                excerpts.len() - SHOWN_EXCERPTS
            )
        } else {
            excerpts.join("; ")
        };
        write!(summary, " Key issues: {}.", issues)?;
    }

    let high = ordered
        .iter()
        .filter(|r| r.priority == Priority::High)
        .count();
    if high > 0 {
        write!(
            summary,
            " ⚠️  {} high-priority issue{} require{} immediate attention.",
            high,
            plural(high),
            if high == 1 { "s" } else { "" }
        )?;
    }

    Ok(summary)
}

/// 摘要生成失败时使用的最简摘要
pub fn fallback_summary(count: usize) -> String {
    format!("Analyzed {} support tickets.", count)
}

/// 由已保存的分析记录计算分类/优先级分布
pub fn tickets_summary(analyses: &[StoredAnalysis]) -> TicketsSummary {
    let mut category_data: Vec<DistributionEntry> = Vec::new();
    for analysis in analyses {
        let name = analysis.category.replace('_', " ");
        match category_data.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.count += 1,
            None => category_data.push(DistributionEntry { name, count: 1 }),
        }
    }
    category_data.sort_by(|a, b| b.count.cmp(&a.count));

    let mut priority_data: Vec<DistributionEntry> = Vec::new();
    for analysis in analyses {
        let name = capitalize(&analysis.priority);
        match priority_data.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.count += 1,
            None => priority_data.push(DistributionEntry { name, count: 1 }),
        }
    }
    priority_data.sort_by_key(|entry| std::cmp::Reverse(priority_rank(&entry.name)));

    TicketsSummary {
        category_data,
        priority_data,
        total_analyzed: analyses.len(),
        message: None,
    }
}

/// 还没有任何批次时的分布
pub fn empty_tickets_summary() -> TicketsSummary {
    TicketsSummary {
        category_data: Vec::new(),
        priority_data: Vec::new(),
        total_analyzed: 0,
        message: Some(
            "No analysis runs yet. Run analysis to see ticket distribution.".to_string(),
        ),
    }
}

fn collect_excerpts(ordered: &[&TicketAnalysis]) -> Vec<String> {
    let mut excerpts: Vec<String> = Vec::new();
    for result in ordered {
        if excerpts.len() >= MAX_EXCERPTS {
            break;
        }
        let excerpt = excerpt(&result.analysis);
        if !excerpt.is_empty() && !excerpts.contains(&excerpt) {
            excerpts.push(excerpt);
        }
    }
    excerpts
}

/// 第一句话；没有句号时取前 80 个字符
fn excerpt(text: &str) -> String {
    let sentence: String = match text.split_once('.') {
        Some((first, _)) => first.to_string(),
        None => text.chars().take(EXCERPT_FALLBACK_CHARS).collect(),
    };
    sentence.trim().to_string()
}

fn percent(count: usize, total: usize) -> f64 {
    count as f64 / total as f64 * 100.0
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn priority_rank(name: &str) -> u8 {
    match name.to_ascii_lowercase().as_str() {
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}
