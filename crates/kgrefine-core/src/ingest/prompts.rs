//! Prompt templates, one per model-backed stage. Placeholders are `{name}` and
//! are filled with [`render`]; literal braces in the JSON examples are left alone.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const EXTRACTION: &str = r#"-任务目标-
你是一个信息抽取专家。请根据给定文本构建知识图谱，识别所有重要的实体和它们之间的关系。

-构建原则-
1. 区分三种概念：实体（独立存在的对象、人物、地点、组织、产品）、关系（实体之间的动作或联系）、属性（实体的特征、状态或数值）。
2. 形容词、状态词、数量信息作为实体的属性，而不是独立实体。
3. 关系方向必须正确，谓词使用原文中的具体动作词，不要过度概括。
4. 关系的主语和宾语必须是已识别的实体，优先使用最具体的名称（如专有名称）。
5. 不要输出“是”“属于”这类表示类型归属的关系。

-输出格式-
只返回如下 JSON 对象：
{
  "entities": [
    {"name": "实体名称", "type": "实体类型", "description": "简短描述", "attributes": {"属性名": "属性值"}}
  ],
  "relations": [
    {"subject": "主语实体", "predicate": "关系", "object": "宾语实体"}
  ]
}

-示例-
文本：张三是公司的技术总监，负责技术团队。
输出：
{
  "entities": [
    {"name": "张三", "type": "人物", "description": "公司的技术总监", "attributes": {"职位": "技术总监"}},
    {"name": "技术团队", "type": "组织", "description": "公司内部团队", "attributes": {}}
  ],
  "relations": [
    {"subject": "张三", "predicate": "负责", "object": "技术团队"}
  ]
}

文本:
---
{text}
---"#;

pub const SCHEMA_OPTIMIZATION: &str = r#"-任务目标-
你是一个知识建模专家。下面是从文本中初步抽取的实体及关系，请归纳出一套精简、规范的模式（schema）。

-要求-
1. 合并同义或近义的实体类型（如“人”“人物”“个人”统一为“人物”）。
2. 合并同义的关系类型，保留能区分语义的具体动词。
3. 归纳出实体常见的属性类型（如“职位”“年龄”“价格”）。
4. 只包含在输入中出现过的概念，不要臆造。

-输入实体-
{entities}

-输入关系-
{relations}

-输出格式-
只返回如下 JSON 对象：
{
  "entities": ["实体类型"],
  "relations": ["关系类型"],
  "attributes": ["属性类型"]
}"#;

pub const REFINEMENT: &str = r#"-任务目标-
你是一个知识图谱质量专家。请依据给定的模式，对候选三元组进行精炼与重标注。

-要求-
1. 将每个谓词映射为模式中语义最接近的关系类型；无法映射时保留原谓词。
2. 删除重复、无意义或主语与宾语相同的三元组。
3. 不要修改主语和宾语的名称。
4. 每个三元组必须同时包含 subject、predicate、object 三个字段。

-模式-
{schema}

-候选三元组-
{triples}

-输出格式-
只返回如下 JSON 对象：
{
  "refined_triples": [
    {"subject": "主语", "predicate": "关系", "object": "宾语"}
  ]
}"#;

pub const ROLE_CENSUS: &str = r#"-任务目标-
你是一个阅读理解专家。请逐步推理，统计文本中每一类角色实际包含多少个相互独立的个体。

-要求-
1. 同一个体的不同称呼（全名、简称、头衔、代词）只计为一个。
2. 先在 reasoning 中写出推理过程，说明哪些称呼指向同一个体。
3. 再在 character_counts 中给出每类角色的独立个体数量。

-输出格式-
只返回如下 JSON 对象：
{
  "reasoning": "推理过程",
  "character_counts": {"角色类型": 1}
}

文本:
---
{text}
---"#;

pub const ENTITY_LINKING: &str = r#"-任务目标-
你是一个实体消歧专家。请结合角色分析结果，把指向同一现实个体的不同名称映射到同一个规范名称。

-要求-
1. 为每个输入名称给出映射，名称集合中的每一项都必须出现在 alias_map 的键中。
2. 规范名称必须取自输入名称，选择最具体、最正式的那个（如专有全名）。
3. 规范名称映射到它自己。
4. 不同个体绝不能合并；合并后的个体数量应与角色分析的结论一致。

-角色分析-
{character_analysis}

-名称列表-
{entities}

-输出格式-
只返回如下 JSON 对象：
{
  "alias_map": {"别名": "规范名称", "规范名称": "规范名称"}
}"#;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

/// Replaces each `{key}` with its value in a single pass over the template.
/// Inserted values are never rescanned; unknown keys stay as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}
