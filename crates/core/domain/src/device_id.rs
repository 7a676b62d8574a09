//! 模拟设备 ID 规则：`{simID}-{targetID}-{modelID}-{NNNN}`。
//!
//! 编号取自已持久化的设备，而非内存计数器，因此跨进程重启仍然连续。

/// 某个模拟在某个目标上的全部设备共用的前缀。
pub fn simulation_device_prefix(simulation_id: &str, target_id: &str) -> String {
    format!("{}-{}-", simulation_id, target_id)
}

/// `(simulation, target, model)` 三元组的设备前缀。
pub fn device_id_prefix(simulation_id: &str, target_id: &str, model_id: &str) -> String {
    format!("{}-{}-{}-", simulation_id, target_id, model_id)
}

/// 按前缀生成设备 ID，编号至少补齐 4 位。
pub fn format_device_id(prefix: &str, suffix: u32) -> String {
    format!("{}{:04}", prefix, suffix)
}

/// 解析编号；前缀不匹配或余下部分不全是数字时返回 None。
pub fn parse_device_suffix(prefix: &str, device_id: &str) -> Option<u32> {
    let rest = device_id.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse::<u32>().ok()
}

/// 已有设备中该前缀的最大编号（无匹配为 0）。
pub fn max_device_suffix<'a, I>(prefix: &str, device_ids: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    device_ids
        .into_iter()
        .filter_map(|id| parse_device_suffix(prefix, id))
        .max()
        .unwrap_or(0)
}

/// 从 `max_existing + 1` 开始分配 `count` 个连续 ID。
pub fn allocate_device_ids(prefix: &str, max_existing: u32, count: usize) -> Vec<String> {
    (1..=count as u32)
        .map(|offset| format_device_id(prefix, max_existing.saturating_add(offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_four_digit_suffix() {
        let prefix = device_id_prefix("sim", "tgt", "thermostat");
        assert_eq!(format_device_id(&prefix, 7), "sim-tgt-thermostat-0007");
        assert_eq!(format_device_id(&prefix, 12345), "sim-tgt-thermostat-12345");
    }

    #[test]
    fn max_suffix_ignores_other_models_sharing_a_prefix() {
        let prefix = device_id_prefix("sim", "tgt", "m");
        let ids = [
            "sim-tgt-m-0003",
            "sim-tgt-m-0010",
            "sim-tgt-m-x-0099",
            "sim-tgt-other-0500",
            "other-tgt-m-0700",
        ];
        assert_eq!(max_device_suffix(&prefix, ids), 10);
    }

    #[test]
    fn allocation_continues_after_existing_maximum() {
        let prefix = device_id_prefix("s", "t", "m");
        let ids = allocate_device_ids(&prefix, 9, 3);
        assert_eq!(ids, vec!["s-t-m-0010", "s-t-m-0011", "s-t-m-0012"]);
        assert!(allocate_device_ids(&prefix, 0, 0).is_empty());
    }
}
