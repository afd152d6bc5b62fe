//! Teaching persona system prompts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A lesson description rendered into the experienced-teacher system prompt.
///
/// Only the first four fields are required; the rest default to the usual classroom choices.
///
/// ```yaml
/// topic: 定语从句
/// core_elements: 基本概念、结构和用法
/// learning_goals: 实际应用能力
/// structure_elements: 概念讲解、句型分析、实例讲解
/// teaching_tools: 例句分析
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingPrompt {
    pub topic: String,
    pub core_elements: String,
    pub learning_goals: String,
    pub structure_elements: String,
    #[serde(default = "defaults::content_requirements")]
    pub content_requirements: String,
    #[serde(default = "defaults::teaching_method")]
    pub teaching_method: String,
    #[serde(default = "defaults::teaching_tools")]
    pub teaching_tools: String,
    #[serde(default = "defaults::thinking_direction")]
    pub thinking_direction: String,
    #[serde(default = "defaults::interaction_type")]
    pub interaction_type: String,
    #[serde(default = "defaults::interaction_goal")]
    pub interaction_goal: String,
    #[serde(default = "defaults::word_count")]
    pub word_count: String,
    #[serde(default = "defaults::language_style")]
    pub language_style: String,
    #[serde(default)]
    pub special_requirements: String,
}

mod defaults {
    pub fn content_requirements() -> String {
        "简明扼要".to_string()
    }
    pub fn teaching_method() -> String {
        "逐步思考".to_string()
    }
    pub fn teaching_tools() -> String {
        "实例分析".to_string()
    }
    pub fn thinking_direction() -> String {
        "实际应用".to_string()
    }
    pub fn interaction_type() -> String {
        "思考问题".to_string()
    }
    pub fn interaction_goal() -> String {
        "知识应用".to_string()
    }
    pub fn word_count() -> String {
        "不少于1000字".to_string()
    }
    pub fn language_style() -> String {
        "简明易懂".to_string()
    }
}

impl TeachingPrompt {
    /// A lesson with the required fields and default teaching choices.
    pub fn new(
        topic: impl Into<String>,
        core_elements: impl Into<String>,
        learning_goals: impl Into<String>,
        structure_elements: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            core_elements: core_elements.into(),
            learning_goals: learning_goals.into(),
            structure_elements: structure_elements.into(),
            content_requirements: defaults::content_requirements(),
            teaching_method: defaults::teaching_method(),
            teaching_tools: defaults::teaching_tools(),
            thinking_direction: defaults::thinking_direction(),
            interaction_type: defaults::interaction_type(),
            interaction_goal: defaults::interaction_goal(),
            word_count: defaults::word_count(),
            language_style: defaults::language_style(),
            special_requirements: String::new(),
        }
    }

    /// Parse a lesson from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let prompt: Self = serde_yaml::from_str(yaml)?;
        if prompt.topic.trim().is_empty() {
            return Err(Error::validation(
                "teaching prompt needs a topic",
                Some("topic".to_string()),
            ));
        }
        Ok(prompt)
    }

    /// Load a lesson from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("cannot read persona {}", path.display()), err))?;
        Self::from_yaml(&yaml)
    }

    /// Render the system prompt.
    pub fn render(&self) -> String {
        format!(
            "\
你是一位经验丰富的人民教师，有着20年的教学经验。

现在，你需要向学生讲解\"{topic}\"。

具体要求如下：
1. 教学目标：
   - 帮助学生理解{topic}的{core}
   - 培养学生对{topic}的{goals}

2. 内容结构：
   - 需要按照{structure}等逻辑顺序进行讲解
   - 每个部分要{content}
   - 确保内容的连贯性和层次性

3. 教学方法：
   - 采用{method}的方式
   - 通过{tools}帮助学生理解
   - 鼓励学生思考{thinking}

4. 互动设计：
   - 在适当位置设置{interaction}
   - 引导学生进行{interaction_goal}

5. 输出要求：
   - 字数要求：{word_count}
   - 语言风格：{style}
   - 其他特殊要求：{special}
",
            topic = self.topic,
            core = self.core_elements,
            goals = self.learning_goals,
            structure = self.structure_elements,
            content = self.content_requirements,
            method = self.teaching_method,
            tools = self.teaching_tools,
            thinking = self.thinking_direction,
            interaction = self.interaction_type,
            interaction_goal = self.interaction_goal,
            word_count = self.word_count,
            style = self.language_style,
            special = self.special_requirements,
        )
    }
}
