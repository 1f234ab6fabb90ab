use super::Phase;

/// Semantic role of a phase, inferred from its name and intensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseRole {
    pub is_set: bool,
    pub is_warmup: bool,
    pub is_rest: bool,
    pub qualifies_for_capture: bool,
}

/// Name matching is case-insensitive: a "set" prefix marks a work set,
/// "calentamiento" a warm-up, "descanso"/"recuperación" or intensity
/// "pausa" a rest. Only sets and warm-ups that carry a heart-rate target
/// ask for vital signs when they finish.
pub fn classify_phase(phase: &Phase) -> PhaseRole {
    let name = phase.name.to_lowercase();
    let intensity = phase.intensity.trim().to_lowercase();

    let is_set = name.starts_with("set");
    let is_warmup = name.contains("calentamiento");
    let is_rest =
        name.contains("descanso") || name.contains("recuperación") || intensity == "pausa";
    let has_target = phase.heart_rate_target().is_some();

    PhaseRole {
        is_set,
        is_warmup,
        is_rest,
        qualifies_for_capture: (is_set || is_warmup) && has_target,
    }
}
