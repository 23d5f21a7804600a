//! 命令参数模型。
//!
//! 线路上的参数是无类型 JSON，这里先收敛为 [`ArgValue`]，再由各命令按需调用
//! 显式转换函数；转换失败统一返回带参数名的 [`CommandError`]。

use std::collections::BTreeMap;

use cadlink_core::document::{AciColor, COLOR_BY_LAYER};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CommandError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Number(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(value as f64)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(BTreeMap<String, ArgValue>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式构造，便于测试与客户端拼装请求。
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 显式的 `null` 与缺省等价。
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        match self.0.get(key) {
            None | Some(ArgValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn number(&self, key: &str) -> Result<f64, CommandError> {
        self.optional_number(key)?
            .ok_or_else(|| CommandError::missing(key))
    }

    /// 接受 JSON 数字或可解析为数字的字符串，拒绝 NaN/无穷大。
    pub fn optional_number(&self, key: &str) -> Result<Option<f64>, CommandError> {
        let value = match self.get(key) {
            None => return Ok(None),
            Some(ArgValue::Number(value)) => *value,
            Some(ArgValue::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| CommandError::invalid(key, "a number"))?,
            Some(_) => return Err(CommandError::invalid(key, "a number")),
        };
        if value.is_finite() {
            Ok(Some(value))
        } else {
            Err(CommandError::invalid(key, "a finite number"))
        }
    }

    pub fn text(&self, key: &str) -> Result<String, CommandError> {
        self.optional_text(key)?
            .ok_or_else(|| CommandError::missing(key))
    }

    /// 名称类参数：字符串去除首尾空白后不能为空；数字按字面转换（如图层 `1`）。
    pub fn optional_text(&self, key: &str) -> Result<Option<String>, CommandError> {
        match self.get(key) {
            None => Ok(None),
            Some(ArgValue::Text(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Err(CommandError::invalid(key, "a non-empty string"))
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Some(ArgValue::Number(value)) if value.is_finite() => Ok(Some(value.to_string())),
            Some(_) => Err(CommandError::invalid(key, "a string")),
        }
    }

    /// 非负整数；小数部分非零时视为无效。
    pub fn optional_count(&self, key: &str) -> Result<Option<usize>, CommandError> {
        match self.optional_number(key)? {
            None => Ok(None),
            Some(value) if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 => {
                Ok(Some(value as usize))
            }
            Some(_) => Err(CommandError::invalid(key, "a non-negative integer")),
        }
    }

    pub fn color(&self, key: &str) -> Result<AciColor, CommandError> {
        self.optional_color(key)?
            .ok_or_else(|| CommandError::missing(key))
    }

    /// ACI 颜色索引 `0..=256`。
    pub fn optional_color(&self, key: &str) -> Result<Option<AciColor>, CommandError> {
        match self.optional_number(key)? {
            None => Ok(None),
            Some(value)
                if value.fract() == 0.0 && (0.0..=f64::from(COLOR_BY_LAYER)).contains(&value) =>
            {
                Ok(Some(value as AciColor))
            }
            Some(_) => Err(CommandError::invalid(
                key,
                "an ACI color index between 0 and 256",
            )),
        }
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Args::new();
        for (key, value) in iter {
            args.insert(key, value);
        }
        args
    }
}

/// `"Args": null` 与缺省一样视为空参数表。
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Args, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Args>::deserialize(deserializer)?.unwrap_or_default())
}
