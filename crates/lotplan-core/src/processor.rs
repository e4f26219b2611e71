//! Crafter cycles.
//!
//! A crafter holds at most one recipe in flight. Starting a cycle consumes
//! the recipe's full input set from the input buffer; finishing it deposits
//! the outputs, but only when every output fits the per-item output capacity.
//! A finished cycle whose outputs do not fit stays pending until they do.

use crate::fixed::{Fixed64, seconds_to_ticks};
use crate::id::RecipeId;
use crate::registry::{RecipeDef, Registry};
use crate::runtime::{ProcessorRuntime, StallReason, add_units, take_units};

fn inputs_available(p: &ProcessorRuntime, recipe: &RecipeDef) -> bool {
    recipe
        .inputs
        .iter()
        .all(|e| p.input_buffer.get(&e.item).copied().unwrap_or(0) >= e.quantity)
}

fn outputs_fit(p: &ProcessorRuntime, recipe: &RecipeDef, output_capacity: u32) -> bool {
    recipe.outputs.iter().all(|e| {
        let held = p.output_buffer.get(&e.item).copied().unwrap_or(0);
        held.saturating_add(e.quantity) <= output_capacity
    })
}

/// Pick the recipe to start: the first of `recipes` whose inputs are on hand.
fn select_recipe<'a>(
    p: &ProcessorRuntime,
    registry: &'a Registry,
    recipes: &[RecipeId],
) -> Option<(RecipeId, &'a RecipeDef)> {
    recipes.iter().find_map(|&id| {
        let recipe = registry.get_recipe(id)?;
        inputs_available(p, recipe).then_some((id, recipe))
    })
}

/// Advance a crafter by one tick.
pub fn advance_crafter(
    p: &mut ProcessorRuntime,
    registry: &Registry,
    recipes: &[RecipeId],
    output_capacity: u32,
    tick_rate_hz: u32,
    tick: u64,
) {
    let recipe = match p.active_recipe.and_then(|id| registry.get_recipe(id)) {
        Some(recipe) => recipe,
        None => {
            let Some((id, recipe)) = select_recipe(p, registry, recipes) else {
                p.status.stall_reason = StallReason::NoInput;
                return;
            };
            for entry in &recipe.inputs {
                take_units(&mut p.input_buffer, entry.item, entry.quantity);
            }
            p.active_recipe = Some(id);
            p.cycle_progress_ticks = 0;
            recipe
        }
    };

    let duration = seconds_to_ticks(recipe.seconds, tick_rate_hz);
    if p.cycle_progress_ticks < duration {
        p.cycle_progress_ticks += 1;
    }
    if p.cycle_progress_ticks < duration {
        return;
    }

    if !outputs_fit(p, recipe, output_capacity) {
        p.status.stall_reason = StallReason::OutputBlocked;
        return;
    }
    for entry in &recipe.outputs {
        add_units(&mut p.output_buffer, entry.item, entry.quantity);
        p.produced_items_total += u64::from(entry.quantity);
    }
    p.active_recipe = None;
    p.cycle_progress_ticks = 0;
    p.last_completed_cycle_ticks = duration;
    p.last_completion_tick = Some(tick);
}

/// Fraction of the current cycle done, for display.
pub fn cycle_progress(p: &ProcessorRuntime, registry: &Registry, tick_rate_hz: u32) -> Fixed64 {
    let Some(recipe) = p.active_recipe.and_then(|id| registry.get_recipe(id)) else {
        return Fixed64::ZERO;
    };
    let duration = seconds_to_ticks(recipe.seconds, tick_rate_hz);
    Fixed64::from_num(p.cycle_progress_ticks) / Fixed64::from_num(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn empty_buffer_reports_no_input() {
        let reg = fixture_registry();
        let smelt = reg.recipe_id("smelt").unwrap();
        let mut p = ProcessorRuntime::default();
        advance_crafter(&mut p, &reg, &[smelt], 2, 10, 0);
        assert_eq!(p.status.stall_reason, StallReason::NoInput);
        assert!(p.active_recipe.is_none());
    }

    #[test]
    fn cycle_consumes_then_produces() {
        let reg = fixture_registry();
        let smelt = reg.recipe_id("smelt").unwrap();
        let mut p = ProcessorRuntime::default();
        add_units(&mut p.input_buffer, ore(), 2);

        advance_crafter(&mut p, &reg, &[smelt], 2, 10, 0);
        assert_eq!(p.input_buffer[&ore()], 1);
        assert_eq!(p.active_recipe, Some(smelt));
        assert_eq!(p.cycle_progress_ticks, 1);

        for tick in 1..10 {
            advance_crafter(&mut p, &reg, &[smelt], 2, 10, tick);
        }
        assert_eq!(p.output_buffer[&ingot()], 1);
        assert_eq!(p.produced_items_total, 1);
        assert_eq!(p.last_completion_tick, Some(9));
        assert_eq!(p.last_completed_cycle_ticks, 10);
        assert!(p.active_recipe.is_none());
    }

    #[test]
    fn full_output_holds_finished_cycle() {
        let reg = fixture_registry();
        let smelt = reg.recipe_id("smelt").unwrap();
        let mut p = ProcessorRuntime::default();
        add_units(&mut p.input_buffer, ore(), 1);
        add_units(&mut p.output_buffer, ingot(), 2);

        for tick in 0..15 {
            p.status.stall_reason = StallReason::None;
            advance_crafter(&mut p, &reg, &[smelt], 2, 10, tick);
        }
        assert_eq!(p.status.stall_reason, StallReason::OutputBlocked);
        assert_eq!(p.output_buffer[&ingot()], 2);
        assert_eq!(p.cycle_progress_ticks, 10);

        take_units(&mut p.output_buffer, ingot(), 1);
        p.status.stall_reason = StallReason::None;
        advance_crafter(&mut p, &reg, &[smelt], 2, 10, 15);
        assert_eq!(p.output_buffer[&ingot()], 2);
        assert_eq!(p.status.stall_reason, StallReason::None);
    }

    #[test]
    fn first_runnable_recipe_is_chosen() {
        let reg = fixture_registry();
        let smelt = reg.recipe_id("smelt").unwrap();
        let refine = reg.recipe_id("refine").unwrap();
        let dissolve = reg.recipe_id("dissolve").unwrap();
        let mut p = ProcessorRuntime::default();
        add_units(&mut p.input_buffer, ore(), 1);
        advance_crafter(&mut p, &reg, &[dissolve, refine, smelt], 5, 10, 0);
        assert_eq!(p.active_recipe, Some(refine));
    }

    #[test]
    fn zero_input_recipe_always_starts() {
        let reg = fixture_registry();
        let mine = reg.recipe_id("mine_ore").unwrap();
        let mut p = ProcessorRuntime::default();
        advance_crafter(&mut p, &reg, &[mine], 2, 10, 0);
        assert_eq!(p.status.stall_reason, StallReason::None);
        assert_eq!(
            cycle_progress(&p, &reg, 10),
            Fixed64::from_num(1) / Fixed64::from_num(10)
        );
    }
}
