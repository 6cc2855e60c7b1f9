//! Plain-text rendering of a resolved command

use std::collections::BTreeMap;

use crate::combat::{DamageInstance, DamageSlot, Resolution};

fn sum_by_type<'a>(instances: impl IntoIterator<Item = &'a DamageInstance>) -> Vec<(String, i64)> {
    let mut sums: BTreeMap<&str, i64> = BTreeMap::new();
    for instance in instances {
        let sum = sums.entry(instance.damage_type.as_str()).or_default();
        *sum = sum.saturating_add(instance.value);
    }

    let mut sums: Vec<(String, i64)> = sums.into_iter().map(|(t, v)| (t.to_string(), v)).collect();
    // Largest first; ties stay in type order
    sums.sort_by(|a, b| b.1.cmp(&a.1));
    sums
}

fn format_sums(sums: &[(String, i64)]) -> String {
    if sums.is_empty() {
        return "0".to_string();
    }
    sums.iter()
        .map(|(damage_type, value)| format!("{}{}", value, damage_type))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn format_slot(slot: &DamageSlot) -> String {
    match slot {
        DamageSlot::Miss => "m".to_string(),
        DamageSlot::Hit(instances) => {
            let sums = sum_by_type(instances);
            let text = format_sums(&sums);
            if sums.len() > 1 {
                format!("[{}]", text)
            } else {
                text
            }
        }
    }
}

fn attack_line(resolution: &Resolution) -> Option<String> {
    let rolls = resolution.attack_rolls.as_ref()?;
    let values: Vec<String> = rolls
        .iter()
        .map(|roll| {
            if roll.is_crit {
                format!("[{}]", roll.total_value)
            } else {
                roll.total_value.to_string()
            }
        })
        .collect();
    Some(format!("ATK {}", values.join(", ")))
}

fn damage_line(resolution: &Resolution) -> Option<String> {
    let slots = resolution.damage_results.as_ref()?;
    let per_attack: Vec<String> = slots.iter().map(format_slot).collect();

    let totals = sum_by_type(slots.iter().flat_map(DamageSlot::instances));
    let mut line = format!("DMG {} = {}", per_attack.join(" + "), format_sums(&totals));
    if totals.len() > 1 {
        line.push_str(&format!(" = {}", resolution.total_damage));
    }
    Some(line)
}

/// Render the ATK, DMG and HP lines that apply to `resolution`
pub fn render(resolution: &Resolution) -> Vec<String> {
    let hp_line = resolution
        .hp_result
        .map(|hp| format!("HP {} -> {}", hp.old, hp.new));

    [attack_line(resolution), damage_line(resolution), hp_line]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{AttackOutcome, HpResult};

    fn outcome(total_value: i64, is_hit: bool, is_crit: bool) -> AttackOutcome {
        AttackOutcome {
            is_hit,
            is_crit,
            total_value,
            d20: vec![],
        }
    }

    #[test]
    fn test_render_full_command() {
        let resolution = Resolution {
            attack_rolls: Some(vec![
                outcome(16, true, false),
                outcome(22, true, true),
                outcome(8, false, false),
            ]),
            damage_results: Some(vec![
                DamageSlot::Hit(vec![DamageInstance::new(3, "fi"), DamageInstance::new(5, "")]),
                DamageSlot::Miss,
                DamageSlot::Hit(vec![DamageInstance::new(8, "fi")]),
            ]),
            total_damage: 16,
            hp_result: Some(HpResult::after(107, 16)),
        };

        assert_eq!(
            render(&resolution),
            vec![
                "ATK 16, [22], 8".to_string(),
                "DMG [5 + 3fi] + m + 8fi = 11fi + 5 = 16".to_string(),
                "HP 107 -> 91".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_single_type_total() {
        let resolution = Resolution {
            attack_rolls: None,
            damage_results: Some(vec![DamageSlot::Hit(vec![
                DamageInstance::new(10, "fi"),
                DamageInstance::new(6, "fi"),
            ])]),
            total_damage: 16,
            hp_result: None,
        };
        assert_eq!(render(&resolution), vec!["DMG 16fi = 16fi".to_string()]);
    }

    #[test]
    fn test_render_saturated_sums() {
        let resolution = Resolution {
            attack_rolls: None,
            damage_results: Some(vec![DamageSlot::Hit(vec![
                DamageInstance::new(i64::MAX, "fi"),
                DamageInstance::new(1, "fi"),
            ])]),
            total_damage: i64::MAX,
            hp_result: None,
        };
        let line = format!("DMG {max}fi = {max}fi", max = i64::MAX);
        assert_eq!(render(&resolution), vec![line]);
    }

    #[test]
    fn test_render_all_misses() {
        let resolution = Resolution {
            attack_rolls: Some(vec![outcome(3, false, false)]),
            damage_results: Some(vec![DamageSlot::Miss]),
            total_damage: 0,
            hp_result: None,
        };
        assert_eq!(
            render(&resolution),
            vec!["ATK 3".to_string(), "DMG m = 0".to_string()]
        );
    }
}
