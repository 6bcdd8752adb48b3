/// 区分"字段缺失"与"显式 null"的部分更新辅助模块

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `Option<Option<T>>`：缺失 -> None，null -> Some(None)，值 -> Some(Some(v))
///
/// 需要配合 `#[serde(default)]` 使用，否则缺失字段会报错。
pub mod double_option {
    use super::*;

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
