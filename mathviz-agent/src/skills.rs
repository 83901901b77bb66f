//! Visualization skills: prompt snippets plus a reference code template.
//!
//! A catalog is loaded once and shared read-only between requests. The
//! on-disk layout is
//!
//! ```text
//! skills/
//!   visualization/*.md
//!   grade_specific/<elementary|middle_school|high_school|university>/*.md
//! ```

use crate::domain::GradeLevel;
use mathviz_error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const GRADE_FOLDERS: [&str; 4] = ["elementary", "middle_school", "high_school", "university"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Lower-cased match terms
    pub keywords: Vec<String>,
    pub code_template: String,
    /// Full markdown, injected into code-generation prompts
    pub prompt: String,
    /// Grade folder for grade-specific skills
    pub grade: Option<String>,
}

fn python_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```python[^\n]*\n(.*?)```").expect("python block regex"))
}

fn keywords_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^\s*(?:[-*]\s*)?(?:\*\*)?(?:关键词|keywords)(?:\*\*)?\s*[：:]\s*(.+)$")
            .expect("keywords regex")
    })
}

impl Skill {
    /// Parse a skill from its markdown source
    pub fn parse(name: impl Into<String>, content: &str, grade: Option<&str>) -> Self {
        let description = content
            .lines()
            .find_map(|l| l.strip_prefix("# "))
            .map(|d| d.trim().to_string())
            .unwrap_or_default();

        let keywords = keywords_regex()
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .flat_map(|m| m.as_str().split([',', '，', '、', ';', '；']))
            .map(|k| k.trim().trim_matches('`').to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let code_template = python_block_regex()
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim_end())
            .max_by_key(|block| block.len())
            .unwrap_or_default()
            .to_string();

        Self {
            name: name.into(),
            description,
            keywords,
            code_template,
            prompt: content.to_string(),
            grade: grade.map(str::to_string),
        }
    }

    /// Number of keywords found in `problem`
    pub fn score(&self, problem: &str) -> usize {
        let problem = problem.to_lowercase();
        self.keywords.iter().filter(|k| problem.contains(k.as_str())).count()
    }

    /// Whether the skill may be used for `grade`
    pub fn applies_to(&self, grade: GradeLevel) -> bool {
        self.grade.as_deref().map_or(true, |g| g == grade.skill_folder())
    }
}

/// Read-only lookup of the skill that best fits a problem
pub trait SkillRepository: Send + Sync {
    fn find_best_match(&self, problem: &str, grade: GradeLevel) -> Option<&Skill>;
}

#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: BTreeMap<String, Skill>,
}

impl SkillCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, skill: Skill) {
        self.skills.insert(skill.name.clone(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    /// Load every skill under `root`
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::config_invalid(format!(
                "skills directory {} does not exist",
                root.display()
            ))
            .with_operation("skills::load_dir"));
        }

        let mut catalog = Self::new();
        catalog.load_folder(&root.join("visualization"), None)?;

        for folder in GRADE_FOLDERS {
            catalog.load_folder(&root.join("grade_specific").join(folder), Some(folder))?;
        }

        info!(count = catalog.len(), root = %root.display(), "skills loaded");
        Ok(catalog)
    }

    fn load_folder(&mut self, dir: &Path, grade: Option<&str>) -> Result<()> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "skill folder missing, skipped");
            return Ok(());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| Error::from(e).with_context("path", dir.display().to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "md"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable skill skipped");
                    continue;
                }
            };
            let name = match grade {
                Some(g) => format!("{}/{}", g, stem),
                None => stem.to_string(),
            };
            self.insert(Skill::parse(name, &content, grade));
        }
        Ok(())
    }
}

impl SkillRepository for SkillCatalog {
    /// Highest keyword score wins; grade-specific skills win ties
    fn find_best_match(&self, problem: &str, grade: GradeLevel) -> Option<&Skill> {
        let mut best: Option<((usize, bool), &Skill)> = None;

        for skill in self.skills.values().filter(|s| s.applies_to(grade)) {
            let rank = (skill.score(problem), skill.grade.is_some());
            if rank.0 == 0 {
                continue;
            }
            if best.as_ref().map_or(true, |(r, _)| rank > *r) {
                best = Some((rank, skill));
            }
        }

        best.map(|(rank, skill)| {
            debug!(skill = %skill.name, score = rank.0, "skill matched");
            skill
        })
    }
}
