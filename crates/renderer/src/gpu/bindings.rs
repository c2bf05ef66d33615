//! Mapping from uniform slots and uploaded sampler units to bind-group
//! entries.
//!
//! Programs upload a unit for every sampler slot the same way a GL program
//! would. The bind group, however, has one fixed binding per sampler slot, so
//! at draw time each slot's unit is resolved to whatever texture is bound on
//! that unit.

use crate::backend::{TextureId, UniformLocation, UniformValue};
use crate::error::{RenderError, Result};
use crate::uniforms::{SlotKind, UniformTable};

use super::pipeline::{AUDIO_BINDING_BASE, BUFFER_BINDING_BASE};
use super::uniforms::UniformLayout;

/// One texture entry of a pass bind group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SamplerBinding {
    pub binding: u32,
    pub unit: u32,
    pub texture: TextureId,
}

/// Location of `slot`, or `None` when the slot has nothing backing it: user
/// uniforms of malformed arity have no block member.
pub(crate) fn slot_location(
    table: &UniformTable,
    layout: &UniformLayout,
    slot: usize,
) -> Option<UniformLocation> {
    let entry = table.slots().get(slot)?;
    if entry.kind.is_sampler() || layout.member(slot).is_some() {
        Some(UniformLocation::from_raw(slot as u32))
    } else {
        None
    }
}

/// Unit carried by an upload to a sampler slot. Negative units are dropped,
/// which leaves the slot on its default unit.
pub(crate) fn sampler_unit(value: UniformValue) -> Option<u32> {
    match value {
        UniformValue::Int(unit) => u32::try_from(unit).ok(),
        _ => None,
    }
}

/// Resolves every sampler slot of `table` to a texture.
///
/// `uploaded` holds the unit last uploaded per slot; a slot without an upload
/// uses its default unit (the audio channel's unit, or the buffer index).
/// Audio slots resolve against `audio_units`, buffer slots against
/// `buffer_units`.
pub(crate) fn resolve_sampler_bindings(
    table: &UniformTable,
    uploaded: &[Option<u32>],
    audio_units: &[Option<TextureId>],
    buffer_units: &[Option<TextureId>],
) -> Result<Vec<SamplerBinding>> {
    let mut bindings = Vec::new();
    for (slot, entry) in table.slots().iter().enumerate() {
        let uploaded = uploaded.get(slot).copied().flatten();
        let (binding, unit, units) = match entry.kind {
            SlotKind::AudioSampler(channel) => (
                AUDIO_BINDING_BASE + channel.unit(),
                uploaded.unwrap_or(channel.unit()),
                audio_units,
            ),
            SlotKind::BufferSampler(index) => (
                BUFFER_BINDING_BASE + index as u32,
                uploaded.unwrap_or(index as u32),
                buffer_units,
            ),
            _ => continue,
        };
        let texture = units
            .get(unit as usize)
            .copied()
            .flatten()
            .ok_or(RenderError::UnboundUnit { unit })?;
        bindings.push(SamplerBinding {
            binding,
            unit,
            texture,
        });
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use passconfig::{BufferDescriptor, ShaderConfig, UniformDefinition};

    use super::*;
    use crate::uniforms::NUM_BUILTIN_UNIFORMS;

    fn table() -> UniformTable {
        UniformTable::new(&ShaderConfig {
            buffers: vec![
                BufferDescriptor::window_sized("trail"),
                BufferDescriptor::fixed("lut", 16, 1),
            ],
            render_order: vec![0, 1],
            uniforms: vec![
                UniformDefinition::new("uGain", [0.5]),
                UniformDefinition::new("uBroken", Vec::<f32>::new()),
            ],
            ..Default::default()
        })
    }

    fn ids(raw: &[u32]) -> Vec<Option<TextureId>> {
        raw.iter().map(|&raw| Some(TextureId::from_raw(raw))).collect()
    }

    #[test]
    fn default_units_map_each_slot_to_its_own_binding() {
        let table = table();
        let audio = ids(&[1, 2, 3, 4]);
        let buffers = ids(&[10, 20]);

        let bindings =
            resolve_sampler_bindings(&table, &vec![None; table.len()], &audio, &buffers)
                .expect("all units bound");

        let expected: Vec<(u32, u32, u32)> = vec![
            (AUDIO_BINDING_BASE, 0, 1),
            (AUDIO_BINDING_BASE + 1, 1, 2),
            (AUDIO_BINDING_BASE + 2, 2, 3),
            (AUDIO_BINDING_BASE + 3, 3, 4),
            (BUFFER_BINDING_BASE, 0, 10),
            (BUFFER_BINDING_BASE + 1, 1, 20),
        ];
        let actual: Vec<(u32, u32, u32)> = bindings
            .iter()
            .map(|b| (b.binding, b.unit, b.texture.raw()))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn uploaded_units_remap_the_texture_but_not_the_binding() {
        let table = table();
        let mut uploaded = vec![None; table.len()];
        uploaded[NUM_BUILTIN_UNIFORMS] = Some(1);
        uploaded[NUM_BUILTIN_UNIFORMS + 1] = Some(0);
        uploaded[6] = Some(3);

        let bindings = resolve_sampler_bindings(
            &table,
            &uploaded,
            &ids(&[1, 2, 3, 4]),
            &ids(&[10, 20]),
        )
        .expect("all units bound");

        let trail = bindings
            .iter()
            .find(|b| b.binding == BUFFER_BINDING_BASE)
            .expect("trail binding");
        assert_eq!((trail.unit, trail.texture.raw()), (1, 20));
        let lut = bindings
            .iter()
            .find(|b| b.binding == BUFFER_BINDING_BASE + 1)
            .expect("lut binding");
        assert_eq!((lut.unit, lut.texture.raw()), (0, 10));
        let sound_right = bindings
            .iter()
            .find(|b| b.binding == AUDIO_BINDING_BASE)
            .expect("iSoundR binding");
        assert_eq!((sound_right.unit, sound_right.texture.raw()), (3, 4));
    }

    #[test]
    fn unbound_unit_is_an_error() {
        let table = table();
        let uploaded = vec![None; table.len()];
        let audio = ids(&[1, 2, 3, 4]);
        let buffers = ids(&[10, 20]);

        let half_bound = [Some(TextureId::from_raw(10)), None];
        let err = resolve_sampler_bindings(&table, &uploaded, &audio, &half_bound).unwrap_err();
        assert!(matches!(err, RenderError::UnboundUnit { unit: 1 }));

        let mut remapped = uploaded.clone();
        remapped[NUM_BUILTIN_UNIFORMS] = Some(7);
        let err = resolve_sampler_bindings(&table, &remapped, &audio, &buffers).unwrap_err();
        assert!(matches!(err, RenderError::UnboundUnit { unit: 7 }));

        let err = resolve_sampler_bindings(&table, &uploaded, &audio[..3], &buffers).unwrap_err();
        assert!(matches!(err, RenderError::UnboundUnit { unit: 3 }));
    }

    #[test]
    fn locations_cover_samplers_and_laid_out_values_only() {
        let table = table();
        let layout = UniformLayout::new(&table);

        assert!(slot_location(&table, &layout, 3).is_some());
        assert!(slot_location(&table, &layout, 6).is_some());
        assert!(slot_location(&table, &layout, NUM_BUILTIN_UNIFORMS + 1).is_some());
        let gain = table.slot_of("uGain").expect("uGain slot");
        assert_eq!(
            slot_location(&table, &layout, gain).map(UniformLocation::raw),
            Some(gain as u32)
        );
        let broken = table.slot_of("uBroken").expect("uBroken slot");
        assert_eq!(slot_location(&table, &layout, broken), None);
        assert_eq!(slot_location(&table, &layout, table.len()), None);
    }

    #[test]
    fn sampler_units_come_from_non_negative_ints() {
        assert_eq!(sampler_unit(UniformValue::Int(2)), Some(2));
        assert_eq!(sampler_unit(UniformValue::Int(-1)), None);
        assert_eq!(sampler_unit(UniformValue::Float(2.0)), None);
    }
}
