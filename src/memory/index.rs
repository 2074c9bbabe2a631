//! memory_index.json：每个 markdown 文件一条索引（关键词、摘要、类别、优先级）
//!
//! 关键词：标题、正则匹配的 2-4 字中文片段、3 个字母以上的英文单词。

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::evolution::types::now_rfc3339;

pub const INDEX_VERSION: u32 = 1;

const SUMMARY_MAX_CHARS: usize = 200;
const MAX_CJK_KEYWORDS: usize = 10;
const MAX_KEYWORDS: usize = 15;
const STOP_WORDS: [&str; 8] = ["the", "and", "for", "are", "but", "not", "you", "all"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub source: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: String,
    /// preference / fact / logic
    #[serde(default)]
    pub category: String,
    /// 0-10，越高越优先参与 recall
    #[serde(default)]
    pub priority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIndex {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: now_rfc3339(),
            entries: Vec::new(),
        }
    }
}

impl MemoryIndex {
    /// 按 source 覆盖或追加
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.entries.iter_mut().find(|e| e.source == entry.source) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, source: &str) {
        self.entries.retain(|e| e.source != source);
    }

    pub fn touch(&mut self) {
        self.version = INDEX_VERSION;
        self.updated_at = now_rfc3339();
    }
}

/// 为一个文件生成索引条目
pub fn entry_for(source: &Path, content: &str) -> IndexEntry {
    let source_str = source.to_string_lossy().to_string();
    let mut keywords = heading_keywords(content);
    let mut seen: HashSet<String> = keywords.iter().cloned().collect();
    for kw in content_keywords(content) {
        if seen.insert(kw.clone()) {
            keywords.push(kw);
        }
    }

    IndexEntry {
        category: category_for(&source_str, content).to_string(),
        priority: priority_for(&source_str),
        summary: summary_for(content),
        keywords,
        source: source_str,
    }
}

fn heading_keywords(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            if !trimmed.starts_with('#') {
                return None;
            }
            let title = trimmed.trim_start_matches('#').trim();
            (!title.is_empty()).then(|| title.to_string())
        })
        .collect()
}

/// 去掉标题、空行、引用块后的前三行，截断到 200 字符
pub fn summary_for(content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('>'))
        .take(3)
        .collect();
    let joined = lines.join(" ");
    if joined.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = joined.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        joined
    }
}

static CJK_WORD: OnceLock<Regex> = OnceLock::new();
static ASCII_WORD: OnceLock<Regex> = OnceLock::new();

fn cjk_word() -> &'static Regex {
    CJK_WORD.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fa5}]{2,4}").expect("valid CJK pattern"))
}

fn ascii_word() -> &'static Regex {
    ASCII_WORD.get_or_init(|| Regex::new(r"[A-Za-z]{3,}").expect("valid word pattern"))
}

/// 中文连续段按 2-4 字匹配，英文取 3 个字母以上的单词
pub fn content_keywords(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for m in cjk_word().find_iter(content) {
        if out.len() >= MAX_CJK_KEYWORDS {
            break;
        }
        let word = m.as_str().to_string();
        if seen.insert(word.clone()) {
            out.push(word);
        }
    }

    for m in ascii_word().find_iter(content) {
        if out.len() >= MAX_KEYWORDS {
            break;
        }
        let lower = m.as_str().to_ascii_lowercase();
        if STOP_WORDS.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower.clone()) {
            out.push(lower);
        }
    }
    out
}

fn category_for(source: &str, content: &str) -> &'static str {
    if source.ends_with("hot.md") {
        return "preference";
    }
    if content.contains("目标") || content.contains("偏好") {
        return "preference";
    }
    if content.contains("项目") || content.contains("设计") || content.contains("架构") {
        return "logic";
    }
    "fact"
}

fn priority_for(source: &str) -> u8 {
    if source.ends_with("hot.md") {
        10
    } else if source.contains("long-term") {
        7
    } else if source.contains("archive") {
        5
    } else {
        3
    }
}

/// 查询词与条目的相关性得分；0 表示不相关
pub fn score(entry: &IndexEntry, query: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower.split_whitespace().collect();
    let mut score = 0.0;

    for kw in &entry.keywords {
        let kw_lower = kw.to_lowercase();
        if kw_lower.is_empty() {
            continue;
        }
        for w in &words {
            if kw_lower.contains(w) || w.contains(kw_lower.as_str()) {
                score += 1.0;
            }
        }
        if !query_lower.is_empty()
            && (kw_lower.contains(&query_lower) || query_lower.contains(&kw_lower))
        {
            score += 2.0;
        }
    }

    let summary_lower = entry.summary.to_lowercase();
    for w in &words {
        if summary_lower.contains(w) {
            score += 0.5;
        }
    }

    score * (1.0 + entry.priority as f64 / 10.0)
}

/// domain 过滤：dev / learning / life 按路径关键字判断，其它值不过滤
pub fn matches_domain(source: &str, domain: &str) -> bool {
    let s = source.to_lowercase();
    let any = |keys: &[&str]| keys.iter().any(|k| s.contains(k));
    match domain {
        "dev" => any(&["dev", "开发", "项目"]),
        "learning" => any(&["learning", "学习", "笔记"]),
        "life" => any(&["life", "生活", "习惯"]),
        _ => true,
    }
}
