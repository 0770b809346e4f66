//! Special ability effects.
//!
//! Coefficients come from [`AbilityConfig`]; nothing here is tuned in code.

use crate::config::AbilityConfig;
use crate::territory::{CreatureInLane, SpecialAbility};

/// Refill per-wave resources (the shield) for a creature.
pub fn reset_for_wave(creature: &mut CreatureInLane, config: &AbilityConfig) {
    if creature.stats.special_ability == Some(SpecialAbility::Shield) {
        creature.effects.shield = config.shield_amount;
    }
}

/// Advance timers, deal poison and apply periodic heals for one tick.
///
/// Poison ignores shields. A creature killed by poison is not healed.
pub fn upkeep(creature: &mut CreatureInLane, dt_ms: u32, config: &AbilityConfig) {
    let effects = &mut creature.effects;
    effects.stunned_ms = effects.stunned_ms.saturating_sub(dt_ms);
    effects.stun_cooldown_ms = effects.stun_cooldown_ms.saturating_sub(dt_ms);

    if effects.poison_ms > 0 {
        let damage = effects.poison_damage;
        effects.poison_ms = effects.poison_ms.saturating_sub(dt_ms);
        if effects.poison_ms == 0 {
            effects.poison_damage = 0;
        }
        creature.take_damage(damage);
    }

    if creature.stats.special_ability == Some(SpecialAbility::Heal)
        && creature.is_alive()
        && config.heal_interval_ms > 0
    {
        creature.effects.heal_elapsed_ms += dt_ms;
        while creature.effects.heal_elapsed_ms >= config.heal_interval_ms {
            creature.effects.heal_elapsed_ms -= config.heal_interval_ms;
            creature.heal(heal_amount(creature.max_health(), config));
        }
    }
}

/// Health restored by one heal.
#[must_use]
pub fn heal_amount(max_health: u32, config: &AbilityConfig) -> u32 {
    if config.heal_percent == 0 {
        return 0;
    }
    let amount = u64::from(max_health) * u64::from(config.heal_percent) / 100;
    u32::try_from(amount).unwrap_or(u32::MAX).max(1)
}

/// Attack multiplier from abilities for the creature's next attack.
#[must_use]
pub fn attack_factor(attacker: &CreatureInLane, config: &AbilityConfig) -> f64 {
    if attacker.stats.special_ability == Some(SpecialAbility::Burst) && !attacker.effects.burst_spent
    {
        config.burst_multiplier
    } else {
        1.0
    }
}

/// Let the defender's shield soak damage. Returns `(passed_through, absorbed)`.
pub fn absorb(defender: &mut CreatureInLane, damage: u32) -> (u32, u32) {
    let absorbed = damage.min(defender.effects.shield);
    defender.effects.shield -= absorbed;
    (damage - absorbed, absorbed)
}

/// Mark one-shot abilities as used after the attacker lands a hit.
pub fn after_attack(attacker: &mut CreatureInLane, stunned_target: bool, config: &AbilityConfig) {
    if attacker.stats.special_ability == Some(SpecialAbility::Burst) {
        attacker.effects.burst_spent = true;
    }
    if stunned_target {
        attacker.effects.stun_cooldown_ms = config.stun_cooldown_ms;
    }
}

/// Apply on-hit status effects. Returns `true` if the target was stunned.
pub fn on_hit(
    ability: Option<SpecialAbility>,
    stun_ready: bool,
    target: &mut CreatureInLane,
    config: &AbilityConfig,
) -> bool {
    match ability {
        Some(SpecialAbility::Poison) if config.poison_duration_ms > 0 => {
            target.effects.poison_ms = config.poison_duration_ms;
            target.effects.poison_damage = config.poison_damage_per_tick;
            false
        }
        Some(SpecialAbility::Stun) if stun_ready && config.stun_duration_ms > 0 => {
            target.effects.stunned_ms = target.effects.stunned_ms.max(config.stun_duration_ms);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::territory::{Creature, CreatureId, CreatureStats, ElementType, Side};

    fn creature(ability: Option<SpecialAbility>) -> CreatureInLane {
        let stats = CreatureStats {
            health: 50,
            attack: 10,
            defense: 2,
            speed: 5,
            element: ElementType::Light,
            special_ability: ability,
        };
        CreatureInLane::spawn(
            CreatureId(1),
            &Creature::new("a", "A", stats),
            Side::Player1,
            0,
            1,
            false,
        )
    }

    #[test]
    fn test_shield_refills_per_wave() {
        let config = AbilityConfig::default();
        let mut c = creature(Some(SpecialAbility::Shield));
        reset_for_wave(&mut c, &config);
        assert_eq!(absorb(&mut c, 10), (0, 10));
        assert_eq!(absorb(&mut c, 10), (5, 5));
        assert_eq!(absorb(&mut c, 10), (10, 0));
        reset_for_wave(&mut c, &config);
        assert_eq!(c.effects.shield, config.shield_amount);
    }

    #[test]
    fn test_heal_on_interval() {
        let config = AbilityConfig::default();
        let mut c = creature(Some(SpecialAbility::Heal));
        c.take_damage(20);
        upkeep(&mut c, 2_500, &config);
        assert_eq!(c.health, 30);
        upkeep(&mut c, 500, &config);
        assert_eq!(c.health, 35, "10% of 50 after 3s");
    }

    #[test]
    fn test_poison_ticks_then_expires() {
        let config = AbilityConfig::default();
        let mut target = creature(None);
        assert!(!on_hit(Some(SpecialAbility::Poison), false, &mut target, &config));
        for _ in 0..6 {
            upkeep(&mut target, 500, &config);
        }
        assert_eq!(target.health, 50 - 6 * config.poison_damage_per_tick);
        upkeep(&mut target, 500, &config);
        assert_eq!(target.health, 38, "poison expired");
    }

    #[test]
    fn test_stun_respects_cooldown_flag() {
        let config = AbilityConfig::default();
        let mut target = creature(None);
        assert!(!on_hit(Some(SpecialAbility::Stun), false, &mut target, &config));
        assert!(!target.is_stunned());
        assert!(on_hit(Some(SpecialAbility::Stun), true, &mut target, &config));
        assert!(target.is_stunned());
        upkeep(&mut target, config.stun_duration_ms, &config);
        assert!(!target.is_stunned());
    }

    #[test]
    fn test_burst_once() {
        let config = AbilityConfig::default();
        let mut c = creature(Some(SpecialAbility::Burst));
        assert_eq!(attack_factor(&c, &config), 2.0);
        after_attack(&mut c, false, &config);
        assert_eq!(attack_factor(&c, &config), 1.0);
    }
}
