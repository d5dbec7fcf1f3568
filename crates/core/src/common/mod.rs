pub mod time;

use serde::{Deserialize, Serialize};

/// 名称中标记风险警示的片段 (`ST` 同时覆盖 `*ST`)。
const FLAG_MARKERS: [&str; 2] = ["ST", "退"];

/// # Summary
/// 证券标的实体，代表股票池中的一只可交易品种。
///
/// # Invariants
/// - `code` 必须是合法的交易代码，且在股票池内唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    // 股票代码 (例如: 600519, 000001)
    pub code: String,
    // 显示名称 (例如: 贵州茅台, *ST 某某)
    pub name: String,
    // 所属市场 (例如: SH, SZ, BJ)
    pub market: String,
}

impl Instrument {
    /// # Summary
    /// 创建证券标的实体。
    pub fn new(code: impl Into<String>, name: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            market: market.into(),
        }
    }

    /// # Summary
    /// 判断该标的是否被标记为风险警示或退市整理。
    ///
    /// # Logic
    /// 1. 检查显示名称是否包含 `ST` (区分大小写，A 股标记总是大写)。
    /// 2. 检查显示名称是否包含退市标记 `退`。
    ///
    /// # Returns
    /// 命中任一标记返回 true。
    pub fn is_flagged(&self) -> bool {
        FLAG_MARKERS.iter().any(|m| self.name.contains(m))
    }

    /// # Summary
    /// 根据交易代码推断所属市场。
    ///
    /// # Logic
    /// 按 A 股代码段划分：6/9 开头为沪市，0/2/3 开头为深市，4/8 开头为北交所。
    ///
    /// # Returns
    /// 无法识别时返回 `None`。
    pub fn infer_market(code: &str) -> Option<&'static str> {
        match code.chars().next()? {
            '6' | '9' => Some("SH"),
            '0' | '2' | '3' => Some("SZ"),
            '4' | '8' => Some("BJ"),
            _ => None,
        }
    }

    /// 所属市场；未登记时按代码推断，仍无法识别则为空串
    pub fn venue(&self) -> &str {
        if self.market.is_empty() {
            Self::infer_market(&self.code).unwrap_or_default()
        } else {
            &self.market
        }
    }
}
