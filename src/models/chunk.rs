//! 文档分块模型
//!
//! 与 AstraDB `document_chunks` 集合中的文档结构一一对应

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 分块元数据
///
/// 上传时写入的元数据字段不固定（professorName、courseCode、topic、section……），
/// 因此保留原始 JSON 对象，只提供按名读取的辅助方法。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkMetadata(pub Map<String, Value>);

impl ChunkMetadata {
    /// 读取字符串字段，空字符串视为缺失
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// 读取字符串数组字段
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

/// 文档分块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(rename = "_id")]
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub chunk_text: String,
    /// 向量字段，查询时通常不返回
    #[serde(rename = "$vector", default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// 带相似度的检索结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// 向量检索的相似度；文本兜底检索时为 None
    pub similarity: Option<f64>,
}

/// 元数据精确匹配过滤条件
///
/// 键使用 AstraDB 的点路径写法，如 `metadata.professorName`、`document_id`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter(pub BTreeMap<String, String>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按文档 ID 过滤
    pub fn document(document_id: &str) -> Self {
        let mut filter = Self::new();
        filter.set("document_id", document_id);
        filter
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// 仅在该键尚未设置时写入
    pub fn set_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.0.contains_key(key) {
            return false;
        }
        self.0.insert(key.to_string(), value.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 转为 AstraDB filter JSON
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// 在内存中判断分块是否满足所有条件
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        self.0.iter().all(|(key, expected)| match key.strip_prefix("metadata.") {
            Some(field) => chunk.metadata.0.get(field).and_then(|v| v.as_str()) == Some(expected.as_str()),
            None => match key.as_str() {
                "document_id" => chunk.document_id == *expected,
                "_id" => chunk.id == *expected,
                _ => false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk_with(metadata: Value) -> DocumentChunk {
        serde_json::from_value(json!({
            "_id": "doc1_0_chunk_0",
            "document_id": "doc1",
            "chunk_text": "Acid-base titration",
            "metadata": metadata,
        }))
        .unwrap()
    }

    #[test]
    fn test_filter_matches_metadata_and_document_id() {
        let chunk = chunk_with(json!({"professorName": "Odumosu", "level": "200"}));

        let mut filter = MetadataFilter::document("doc1");
        filter.set("metadata.professorName", "Odumosu");
        assert!(filter.matches(&chunk));

        filter.set("metadata.level", "300");
        assert!(!filter.matches(&chunk));
    }

    #[test]
    fn test_filter_set_if_absent_keeps_existing_value() {
        let mut filter = MetadataFilter::new();
        filter.set("metadata.topic", "Buffers");
        assert!(!filter.set_if_absent("metadata.topic", "Titration"));
        assert!(filter.set_if_absent("metadata.type", "notes"));
        assert_eq!(filter.to_json(), json!({"metadata.topic": "Buffers", "metadata.type": "notes"}));
    }

    #[test]
    fn test_chunk_deserializes_astra_document() {
        let chunk: DocumentChunk = serde_json::from_value(json!({
            "_id": "a",
            "document_id": "d",
            "chunk_index": 3,
            "chunk_text": "text",
            "$vector": [0.1, 0.2],
            "metadata": {"section": "", "relatedConcepts": ["pH", 7]}
        }))
        .unwrap();

        assert_eq!(chunk.vector.len(), 2);
        assert_eq!(chunk.metadata.get_str("section"), None);
        assert_eq!(chunk.metadata.get_str_list("relatedConcepts"), vec!["pH".to_string()]);
    }
}
