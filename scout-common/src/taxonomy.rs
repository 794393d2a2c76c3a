//! Classification taxonomy
//!
//! A taxonomy is three ordered mappings:
//! - hierarchy: broad category → sub-items
//! - impression vocabulary: group → `{label, slug}` entries
//! - object vocabulary: same shape as impressions
//!
//! Ordering is significant (it is the order shown to the model), so all
//! mappings are `IndexMap`s.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Broad category → ordered list of sub-items
pub type Hierarchy = IndexMap<String, Vec<String>>;

/// Group name → ordered list of tag entries
pub type Vocabulary = IndexMap<String, Vec<TagEntry>>;

/// One selectable tag: human-readable label plus machine-safe slug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub label: String,
    pub slug: String,
}

impl TagEntry {
    pub fn new(label: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slug: slug.into(),
        }
    }
}

/// How formatted structures are combined with the current ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Incoming structure replaces the current one
    #[default]
    Replace,
    /// Incoming entries are added to the current structure
    Merge,
}

/// Snapshot of the whole taxonomy handed to the prompt builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub hierarchy: Hierarchy,
    pub impression_tags: Vocabulary,
    pub object_tags: Vocabulary,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::studio_defaults()
    }
}

impl Taxonomy {
    /// Broad category keys in configured order
    pub fn broad_categories(&self) -> impl Iterator<Item = &str> {
        self.hierarchy.keys().map(String::as_str)
    }

    /// All sub-items of all categories, flattened in order
    pub fn all_items(&self) -> impl Iterator<Item = &str> {
        self.hierarchy.values().flatten().map(String::as_str)
    }

    pub fn contains_category(&self, category: &str) -> bool {
        self.hierarchy.contains_key(category)
    }

    /// True when `item` is listed under `category`
    pub fn contains_item(&self, category: &str, item: &str) -> bool {
        self.hierarchy
            .get(category)
            .map(|items| items.iter().any(|i| i == item))
            .unwrap_or(false)
    }

    pub fn impression_label(&self, slug: &str) -> Option<&str> {
        vocabulary_label(&self.impression_tags, slug)
    }

    pub fn object_label(&self, slug: &str) -> Option<&str> {
        vocabulary_label(&self.object_tags, slug)
    }

    /// Default studio / location taxonomy
    pub fn studio_defaults() -> Self {
        Self {
            hierarchy: default_hierarchy(),
            impression_tags: default_impression_tags(),
            object_tags: default_object_tags(),
        }
    }
}

/// Look up the label of a slug anywhere in the vocabulary
pub fn vocabulary_label<'a>(vocabulary: &'a Vocabulary, slug: &str) -> Option<&'a str> {
    vocabulary
        .values()
        .flatten()
        .find(|entry| entry.slug == slug)
        .map(|entry| entry.label.as_str())
}

/// All slugs of a vocabulary in configured order
pub fn vocabulary_slugs(vocabulary: &Vocabulary) -> impl Iterator<Item = &str> {
    vocabulary.values().flatten().map(|entry| entry.slug.as_str())
}

/// Resolve slugs to labels for display; unknown slugs are dropped
pub fn resolve_labels(vocabulary: &Vocabulary, slugs: &[String]) -> Vec<String> {
    slugs
        .iter()
        .filter_map(|slug| vocabulary_label(vocabulary, slug))
        .map(str::to_string)
        .collect()
}

/// Combine hierarchies: union of sub-items per category, first occurrence wins ordering
pub fn merge_hierarchy(base: &mut Hierarchy, incoming: Hierarchy, mode: MergeMode) {
    if mode == MergeMode::Replace {
        *base = incoming;
        return;
    }

    for (category, items) in incoming {
        let existing = base.entry(category).or_default();
        for item in items {
            if !existing.contains(&item) {
                existing.push(item);
            }
        }
    }
}

/// Combine vocabularies: union of entries per group keyed by slug
pub fn merge_vocabulary(base: &mut Vocabulary, incoming: Vocabulary, mode: MergeMode) {
    if mode == MergeMode::Replace {
        *base = incoming;
        return;
    }

    for (group, entries) in incoming {
        let existing = base.entry(group).or_default();
        for entry in entries {
            if !existing.iter().any(|e| e.slug == entry.slug) {
                existing.push(entry);
            }
        }
    }
}

fn hierarchy_from(pairs: &[(&str, &[&str])]) -> Hierarchy {
    pairs
        .iter()
        .map(|(category, items)| {
            (
                category.to_string(),
                items.iter().map(|i| i.to_string()).collect(),
            )
        })
        .collect()
}

fn vocabulary_from(groups: &[(&str, &[(&str, &str)])]) -> Vocabulary {
    groups
        .iter()
        .map(|(group, entries)| {
            (
                group.to_string(),
                entries
                    .iter()
                    .map(|(label, slug)| TagEntry::new(*label, *slug))
                    .collect(),
            )
        })
        .collect()
}

fn default_hierarchy() -> Hierarchy {
    hierarchy_from(&[
        ("ハウススタジオ", &["和風", "洋風", "一軒家", "マンション", "アパート"]),
        ("公園", &["都市公園", "自然公園", "遊具あり", "芝生広場"]),
        ("オフィス", &["執務室", "会議室", "ロビー", "受付"]),
        (
            "商業施設",
            &[
                "ショッピングモール",
                "遊園地",
                "水族館/動物園",
                "博物館/美術館",
                "映画館",
                "商店街",
            ],
        ),
        ("学校", &["小学校", "中学校", "高校", "大学/専門学校", "幼稚園/保育園"]),
        ("病院", &["受付", "待合室", "診察室", "病室", "手術室"]),
        ("店舗", &["コンビニ", "ドラッグストア", "スーパー", "アパレル", "ガソリンスタンド"]),
        (
            "飲食店",
            &["中華料理屋", "レストラン", "カフェ", "居酒屋", "食堂", "BAR", "ファーストフード"],
        ),
        ("自然", &["山", "川", "海", "草原", "森", "湖/池", "花畑"]),
        (
            "その他",
            &["駐車場", "屋上", "神社仏閣", "オープンスペース", "夜景/イルミネーション"],
        ),
    ])
}

fn default_impression_tags() -> Vocabulary {
    vocabulary_from(&[
        (
            "雰囲気",
            &[
                ("モダン", "modern"),
                ("レトロ", "retro"),
                ("ナチュラル", "natural"),
                ("高級感", "luxury"),
                ("カジュアル", "casual"),
                ("和風", "japanese_style"),
                ("洋風", "western_style"),
                ("インダストリアル", "industrial"),
                ("ミニマリスト", "minimalist"),
                ("アーティスティック", "artistic"),
            ],
        ),
        (
            "色調",
            &[
                ("明るい", "bright"),
                ("暗い", "dark"),
                ("暖色系", "warm_colors"),
                ("寒色系", "cool_colors"),
                ("モノトーン", "monotone"),
                ("カラフル", "colorful"),
                ("パステル", "pastel"),
                ("ビビッド", "vivid"),
            ],
        ),
        (
            "空間特性",
            &[
                ("広々", "spacious"),
                ("コンパクト", "compact"),
                ("開放的", "open"),
                ("プライベート", "private"),
                ("天井が高い", "high_ceiling"),
                ("窓が多い", "many_windows"),
            ],
        ),
    ])
}

fn default_object_tags() -> Vocabulary {
    vocabulary_from(&[
        (
            "家具",
            &[
                ("ソファ", "sofa"),
                ("テーブル", "table"),
                ("椅子", "chair"),
                ("ベッド", "bed"),
                ("棚", "shelf"),
                ("デスク", "desk"),
                ("収納", "storage"),
            ],
        ),
        (
            "設備",
            &[
                ("キッチン", "kitchen"),
                ("バスルーム", "bathroom"),
                ("トイレ", "toilet"),
                ("エアコン", "ac"),
                ("照明器具", "lighting"),
                ("暖炉", "fireplace"),
                ("エレベーター", "elevator"),
            ],
        ),
        (
            "装飾・小物",
            &[
                ("カーテン", "curtain"),
                ("絵画", "painting"),
                ("観葉植物", "plants"),
                ("ラグ", "rug"),
                ("時計", "clock"),
                ("鏡", "mirror"),
            ],
        ),
        (
            "建築要素",
            &[
                ("窓", "window"),
                ("ドア", "door"),
                ("階段", "stairs"),
                ("柱", "pillar"),
                ("梁", "beam"),
                ("バルコニー", "balcony"),
            ],
        ),
    ])
}
