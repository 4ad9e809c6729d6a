//! 订阅链接备注（节点显示名）
//!
//! 备注模板首字符为分隔符，其后每个字符依次选择一个名称片段：
//! `i` = 入站备注，`e` = 客户端 email，`o` = 额外文本（外部代理备注）。

use anyhow::Result;

use crate::common::format::format_traffic;
use crate::model::Inbound;

const BLOCKED_MARKER: &str = "⛔️N/A";
const VOLUME_ICON: &str = "📊";
const EXPIRY_ICON: &str = "⏳";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Inbound,
    Email,
    Extra,
}

/// Builds display labels for links.
#[derive(Debug, Clone)]
pub struct RemarkFormatter {
    separator: String,
    order: Vec<Part>,
    show_info: bool,
}

impl RemarkFormatter {
    /// Parse a remark model such as `"-ieo"`.
    ///
    /// Symbols outside `i`/`e`/`o` are an error rather than being skipped.
    pub fn new(model: &str, show_info: bool) -> Result<Self> {
        let mut chars = model.chars();
        let Some(separator) = chars.next() else {
            anyhow::bail!("remark model is empty");
        };
        let order = chars
            .map(|c| match c {
                'i' => Ok(Part::Inbound),
                'e' => Ok(Part::Email),
                'o' => Ok(Part::Extra),
                other => Err(anyhow::anyhow!("unknown remark symbol '{}'", other)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            separator: separator.to_string(),
            order,
            show_info,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Remark for `email` on `inbound`, with the clock at `now` (Unix seconds).
    pub fn format(&self, inbound: &Inbound, email: &str, extra: &str, now: i64) -> String {
        let mut parts: Vec<String> = self
            .order
            .iter()
            .map(|part| match part {
                Part::Inbound => inbound.remark.as_str(),
                Part::Email => email,
                Part::Extra => extra,
            })
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if self.show_info {
            if let Some(stats) = inbound.client_traffic(email) {
                if !stats.enable {
                    return format!(
                        "{}{}{}",
                        BLOCKED_MARKER,
                        self.separator,
                        parts.join(&self.separator)
                    );
                }
                if let Some(vol) = stats.remaining().filter(|v| *v > 0) {
                    parts.push(format!("{}{}", format_traffic(vol), VOLUME_ICON));
                }
                let exp = stats.expiry_time / 1000;
                if exp > 0 {
                    parts.push(countdown((exp - now).max(0)));
                } else if exp < 0 {
                    // 相对时长：尚未开始计时，按绝对值显示
                    parts.push(countdown(-exp));
                }
            }
        }

        parts.join(&self.separator)
    }
}

/// `D,H` / `D` / `H` / `M` rendering of a non-negative duration in seconds.
fn countdown(secs: i64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        if hours > 0 {
            format!("{}D,{}H{}", days, hours, EXPIRY_ICON)
        } else {
            format!("{}D{}", days, EXPIRY_ICON)
        }
    } else if hours > 0 {
        format!("{}H{}", hours, EXPIRY_ICON)
    } else {
        format!("{}M{}", minutes, EXPIRY_ICON)
    }
}
