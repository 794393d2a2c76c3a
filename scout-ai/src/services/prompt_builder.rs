//! Prompt construction
//!
//! Renders a taxonomy snapshot and image count into the instruction text
//! sent alongside the images. Output is a pure function of its inputs: the
//! same taxonomy, image count and options always produce the same text.
//! Image bytes are never embedded here; they travel as separate parts.

use scout_common::taxonomy::{Taxonomy, Vocabulary};
use std::fmt::Write;

use crate::models::classification::fields;
use crate::models::FormatTarget;

/// Which output fields the model is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptScope {
    /// Broad category, specific item and a short reason (folder-batch mode)
    Broad,
    /// Everything, with impression/object sections individually switchable
    Full {
        include_impression: bool,
        include_object: bool,
    },
    /// Category and item judged against labelled example images, with a
    /// 1-10 confidence and the example the model leaned on
    FewShot,
}

impl PromptScope {
    pub fn full() -> Self {
        PromptScope::Full {
            include_impression: true,
            include_object: true,
        }
    }
}

/// Prompt rendering options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOptions {
    pub scope: PromptScope,
    /// Cap on slugs listed per vocabulary (None = list all)
    pub max_slugs: Option<usize>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            scope: PromptScope::full(),
            max_slugs: None,
        }
    }
}

/// Build the classification instruction for `image_count` images
pub fn build_classification_prompt(
    taxonomy: &Taxonomy,
    image_count: usize,
    options: &PromptOptions,
) -> String {
    match options.scope {
        PromptScope::Broad => build_broad_prompt(taxonomy, image_count),
        PromptScope::Full {
            include_impression,
            include_object,
        } => build_full_prompt(
            taxonomy,
            image_count,
            include_impression,
            include_object,
            options.max_slugs,
        ),
        PromptScope::FewShot => build_few_shot_prompt(taxonomy, image_count),
    }
}

/// Text sent before the example images
pub fn few_shot_intro() -> String {
    r#"あなたは映画・TV制作のロケーションコーディネーターです。
以下に示す例を参考に、提供された画像の場所を分類してください。

【例示学習セクション】
以下の例を学習してください：
"#
    .to_string()
}

/// Text sent right after one example image
pub fn example_caption(caption: &str) -> String {
    format!("→ 分類: {}", caption)
}

fn build_few_shot_prompt(taxonomy: &Taxonomy, image_count: usize) -> String {
    let broad = taxonomy.broad_categories().collect::<Vec<_>>().join(", ");

    format!(
        r#"
【判定対象】
以下の{image_count}枚の画像を分析し、上記の例を参考に分類してください。

分類カテゴリー：
大分類: {broad}
各カテゴリーの小項目: {hierarchy}

JSON形式で回答してください：
{{
    "{broad_key}": "最も適切な大分類",
    "{item_key}": "最も適切な小項目",
    "{confidence_key}": "1-10のスコア",
    "{reason_key}": "Few-shot例との類似点を含めた判断根拠",
    "{similar_key}": "参考にしたFew-shot例があれば記載"
}}
"#,
        hierarchy = render_hierarchy(taxonomy),
        broad_key = fields::BROAD_CATEGORY,
        item_key = fields::SPECIFIC_ITEM,
        confidence_key = fields::CONFIDENCE,
        reason_key = fields::REASON,
        similar_key = fields::SIMILAR_EXAMPLE,
    )
}

fn build_broad_prompt(taxonomy: &Taxonomy, image_count: usize) -> String {
    let broad = taxonomy.broad_categories().collect::<Vec<_>>().join(", ");
    let items = taxonomy.all_items().collect::<Vec<_>>().join(", ");

    format!(
        r#"あなたは不動産・撮影スタジオの専門家です。
以下の{image_count}枚の写真は、同一物件の様々な場所を撮影したものです。
これらの写真を総合的に分析し、この物件全体がどのような施設なのかを判定してください。

【重要な判定基準】
- 建物全体の用途と特徴
- 内装のスタイルと統一感
- 設備や家具から推測される使用目的
- 撮影スタジオとしての活用可能性

大分類の選択肢: {broad}
小項目の選択肢: {items}

JSON形式で以下のように簡潔に出力してください：
{{
    "{broad_key}": "最も適切な大分類を1つ",
    "{item_key}": "最も適切な小項目を1つ",
    "{reason_key}": "なぜそう判断したか30文字以内で簡潔に"
}}
"#,
        broad_key = fields::BROAD_CATEGORY,
        item_key = fields::SPECIFIC_ITEM,
        reason_key = fields::REASON,
    )
}

fn build_full_prompt(
    taxonomy: &Taxonomy,
    image_count: usize,
    include_impression: bool,
    include_object: bool,
    max_slugs: Option<usize>,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "あなたはプロの不動産・撮影スタジオコーディネーターです。");
    let _ = writeln!(
        prompt,
        "{}枚の写真を総合的に分析し、物件を分類してください。",
        image_count
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "分類階層:");
    let _ = writeln!(prompt, "{}", render_hierarchy(taxonomy));

    if include_impression {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "印象タグ選択肢（slugで回答）:");
        prompt.push_str(&render_slugs(&taxonomy.impression_tags, max_slugs));
    }

    if include_object {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "オブジェクトタグ選択肢（slugで回答）:");
        prompt.push_str(&render_slugs(&taxonomy.object_tags, max_slugs));
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "以下のJSON形式のみで出力してください：");
    let _ = writeln!(prompt, "{{");
    let _ = writeln!(
        prompt,
        "    \"{}\": \"該当する大分類を1つ選択\",",
        fields::BROAD_CATEGORY
    );
    let _ = writeln!(
        prompt,
        "    \"{}\": \"選択した大分類に対応する小項目を1つ選択\",",
        fields::SPECIFIC_ITEM
    );
    if include_impression {
        let _ = writeln!(
            prompt,
            "    \"{}\": [\"該当するslugを最大5つ\"],",
            fields::IMPRESSION_TAGS
        );
    }
    if include_object {
        let _ = writeln!(
            prompt,
            "    \"{}\": [\"該当するslugを最大8つ\"],",
            fields::OBJECT_TAGS
        );
    }
    let _ = writeln!(prompt, "    \"{}\": \"判定の根拠を50文字以内で\",", fields::REASON);
    let _ = writeln!(prompt, "    \"{}\": \"この物件に適した撮影シーン\",", fields::PURPOSE);
    let _ = writeln!(prompt, "    \"{}\": \"物件の特徴的な要素\"", fields::FEATURES);
    let _ = writeln!(prompt, "}}");

    prompt
}

fn render_hierarchy(taxonomy: &Taxonomy) -> String {
    // IndexMap serializes in insertion order; serialization of string maps cannot fail
    serde_json::to_string_pretty(&taxonomy.hierarchy).unwrap_or_default()
}

/// One line per group: `group: slug(label), slug(label)`; capped at `max_slugs` entries total
fn render_slugs(vocabulary: &Vocabulary, max_slugs: Option<usize>) -> String {
    let mut remaining = max_slugs.unwrap_or(usize::MAX);
    let mut out = String::new();

    for (group, entries) in vocabulary {
        if remaining == 0 {
            break;
        }
        let listed: Vec<String> = entries
            .iter()
            .take(remaining)
            .map(|e| format!("{}({})", e.slug, e.label))
            .collect();
        remaining -= listed.len();
        if !listed.is_empty() {
            let _ = writeln!(out, "- {}: {}", group, listed.join(", "));
        }
    }

    out
}

/// Build the text-only prompt that organises free text into a taxonomy structure
pub fn build_format_prompt(target: FormatTarget, raw_text: &str) -> String {
    match target {
        FormatTarget::Hierarchy => format!(
            r#"以下のテキストを、撮影スタジオ・ロケ地の分類階層として整理してください。
大分類（建物の種類や用途）と、それに対応する小項目（詳細な分類）に整理してください。

入力テキスト:
{raw_text}

以下のJSON形式で出力してください：
{{
    "ハウススタジオ": ["和風", "洋風", "一軒家", "マンション", "アパート"],
    "飲食店": ["カフェ", "レストラン", "BAR", "居酒屋"],
    "オフィス": ["執務室", "会議室", "ロビー"]
}}

ルール:
- 大分類は施設の種類や用途を表す
- 小項目は大分類をさらに詳細に分類したもの
- 類似の項目はまとめる
- 撮影場所として適切な分類にする
"#
        ),
        FormatTarget::ImpressionTags => format!(
            r#"以下のテキストを、撮影スタジオの印象を表すタグとして整理してください。
適切なカテゴリ（雰囲気、色調、空間特性など）に分類し、各タグに日本語ラベルと英語スラッグを付けてください。

入力テキスト:
{raw_text}

以下のJSON形式で出力してください：
{{
    "雰囲気": [{{"label": "モダン", "slug": "modern"}}],
    "色調": [{{"label": "明るい", "slug": "bright"}}],
    "空間特性": [{{"label": "広々", "slug": "spacious"}}]
}}

スラッグは英語小文字とアンダースコアのみ使用してください。
"#
        ),
        FormatTarget::ObjectTags => format!(
            r#"以下のテキストを、撮影スタジオにある物体や設備を表すタグとして整理してください。
適切なカテゴリ（家具、設備、装飾・小物、建築要素など）に分類し、各タグに日本語ラベルと英語スラッグを付けてください。

入力テキスト:
{raw_text}

以下のJSON形式で出力してください：
{{
    "家具": [{{"label": "ソファ", "slug": "sofa"}}],
    "設備": [{{"label": "キッチン", "slug": "kitchen"}}],
    "装飾・小物": [{{"label": "観葉植物", "slug": "plants"}}],
    "建築要素": [{{"label": "階段", "slug": "stairs"}}]
}}

スラッグは英語小文字とアンダースコアのみ使用してください。
"#
        ),
    }
}
