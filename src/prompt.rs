//! Prompt templates and rendering.
//!
//! Templates use `{key}` placeholders. `{{` and `}}` produce literal braces,
//! which the JSON examples inside the templates rely on.

use crate::config::OutputFormat;
use crate::record::TypeVocabulary;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Separator used when listing types in a prompt.
pub const TYPE_JOINER: &str = "、";

/// System prompt for semantic chunking. Placeholders: `{min_chunk}`, `{max_chunk}`.
pub const CHUNKING_SYSTEM: &str = r#"你是一个文本分块专家。你的任务是将用户提供的长文本按照语义边界进行分割，使每个分块保持语义完整性和独立性。

**【分块原则】**
1. **语义完整性**: 每个分块应该包含一个完整的主题或概念
2. **上下文独立**: 每个分块在不依赖其他分块的情况下也能被理解
3. **大小适中**: 每个分块大小在 {min_chunk}-{max_chunk} 字符之间
4. **自然边界**: 优先在段落、章节、主题转换处进行分割

**【输出格式】**
请使用 JSON 数组格式返回分块结果，每个分块包含：
- "title": 分块的简短标题（5-15字）
- "summary": 分块内容的一句话摘要
- "content": 分块的原文内容

示例输出：
```json
[
  {{"title": "人工智能概述", "summary": "介绍AI的定义和研究领域", "content": "人工智能是计算机科学的一个分支..."}},
  {{"title": "深度学习技术", "summary": "说明深度学习的原理和应用", "content": "深度学习是机器学习的一个子领域..."}}
]
```

**【重要提醒】**
- 只输出 JSON 数组，不要有其他解释文字
- content 字段必须是原文的直接引用，不要修改原文
- 确保所有原文内容都被包含在分块中，不要遗漏"#;

/// User prompt for semantic chunking. Placeholder: `{text}`.
pub const CHUNKING_USER: &str = "请将以下文本按语义边界进行分块：\n\n{text}";

/// System prompt for type discovery (phase 1).
pub const DISCOVERY_SYSTEM: &str = r#"<no_think></no_think>
请阅读以下文本，分析其核心主题。
你的任务是定义适合构建"概念星云图"的元数据结构。
请列出文本中最重要的**实体类型**（例如：人物、地点、算法、药物...）。
请列出实体之间可能存在的**关系类型**（例如：属于、位于、导致、发明...）。

输出格式要求（不要输出多余废话）：
ENTITIES: 类型1, 类型2, 类型3
RELATIONS: 关系1, 关系2, 关系3"#;

/// System prompt for constrained extraction (phase 2), tab-separated rows.
pub const EXTRACTION_SYSTEM_TSV: &str = "<no_think></no_think>
你的任务是从文本中提取指定类型的实体和关系。
请严格按照指定的实体类型和关系类型进行提取，不要添加其他类型。

输出格式要求（使用制表符分隔，不要输出多余废话）：
ENTITY\t实体类型\t实体名称
RELATION\t关系类型\t主体\t客体

例如：
ENTITY\t人物\t张三
ENTITY\t地点\t北京
RELATION\t工作于\t张三\tABC公司";

/// System prompt for constrained extraction (phase 2), JSON output.
pub const EXTRACTION_SYSTEM_JSON: &str = r#"<no_think></no_think>
你的任务是从文本中提取指定类型的实体和关系。
请严格按照指定的实体类型和关系类型进行提取，不要添加其他类型。

输出格式要求（只输出 JSON，不要输出多余废话）：
{{"entities": [{{"text": "实体名称", "type": "实体类型"}}], "relations": [{{"type": "关系类型", "subject": "主体", "object": "客体"}}]}}

例如：
{{"entities": [{{"text": "张三", "type": "人物"}}, {{"text": "北京", "type": "地点"}}], "relations": [{{"type": "工作于", "subject": "张三", "object": "ABC公司"}}]}}"#;

/// User prompt for constrained extraction.
/// Placeholders: `{entity_types}`, `{relation_types}`, `{text}`.
pub const EXTRACTION_USER: &str = "需要提取的实体类型：{entity_types}\n需要提取的关系类型：{relation_types}\n\n文本：\n{text}";

/// Build a prompt string with variable substitution.
///
/// Replaces each `{key}` placeholder with its value. Unknown placeholders
/// are left as they are. Values are inserted verbatim, so braces inside a
/// value are never re-interpreted.
///
/// # Example
///
/// ```
/// use llm_extract::prompt::render;
///
/// let result = render("Hello {name}, JSON: {{\"key\": \"val\"}}", &[("name", "Alice")]);
/// assert_eq!(result, r#"Hello Alice, JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template
        .replace("{{", ESCAPE_SENTINEL)
        .replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Values may contain braces or sentinels of their own; substitute last.
    let mut slots = Vec::with_capacity(vars.len());
    for (i, (key, value)) in vars.iter().enumerate() {
        let slot = format!("\x00SLOT{}\x00", i);
        rendered = rendered.replace(&format!("{{{}}}", key), &slot);
        slots.push((slot, *value));
    }

    rendered = rendered
        .replace(ESCAPE_SENTINEL, "{")
        .replace(ESCAPE_SENTINEL_CLOSE, "}");
    for (slot, value) in slots {
        rendered = rendered.replace(&slot, value);
    }
    rendered
}

/// System and user prompt for chunking one segment.
pub fn chunking(text: &str, min_chunk: usize, max_chunk: usize) -> (String, String) {
    let min = min_chunk.to_string();
    let max = max_chunk.to_string();
    (
        render(
            CHUNKING_SYSTEM,
            &[("min_chunk", min.as_str()), ("max_chunk", max.as_str())],
        ),
        render(CHUNKING_USER, &[("text", text)]),
    )
}

/// System and user prompt for type discovery. The segment is the user turn.
pub fn discovery(text: &str) -> (String, String) {
    (DISCOVERY_SYSTEM.to_string(), text.to_string())
}

/// System and user prompt for extraction constrained to `vocabulary`.
pub fn extraction(
    text: &str,
    vocabulary: &TypeVocabulary,
    format: OutputFormat,
) -> (String, String) {
    let system = match format {
        OutputFormat::Tsv => render(EXTRACTION_SYSTEM_TSV, &[]),
        OutputFormat::Json => render(EXTRACTION_SYSTEM_JSON, &[]),
    };
    let entity_types = vocabulary.entity_types().join(TYPE_JOINER);
    let relation_types = vocabulary.relation_types().join(TYPE_JOINER);
    let user = render(
        EXTRACTION_USER,
        &[
            ("entity_types", entity_types.as_str()),
            ("relation_types", relation_types.as_str()),
            ("text", text),
        ],
    );
    (system, user)
}
