//! Pass configuration consumed by the renderer.
//!
//! A [`ShaderConfig`] lists the off-screen buffers, the order in which they
//! are rendered each frame, the user uniforms shared by every pass, and the
//! descriptor of the final image pass. Loading it from disk is left to the
//! caller; everything here derives `serde` so any format works.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("render order entry {position} references buffer {index}, but only {count} buffers are configured")]
    RenderOrderOutOfRange {
        position: usize,
        index: usize,
        count: usize,
    },
    #[error("buffer '{name}' has a fixed size of {width}x{height}; both dimensions must be non-zero")]
    ZeroSize {
        name: String,
        width: u32,
        height: u32,
    },
    #[error("{kind} at position {position} has an empty name")]
    EmptyName { kind: &'static str, position: usize },
    #[error("{kind} name '{name}' is already used by a {first}")]
    DuplicateName {
        kind: &'static str,
        first: &'static str,
        name: String,
    },
    #[error("{kind} name '{name}' is reserved by the shader prelude")]
    ReservedName { kind: &'static str, name: String },
    #[error("{kind} name '{name}' is not a valid shader identifier")]
    InvalidName { kind: &'static str, name: String },
}

/// Names every pass program already declares: the builtin uniforms, the audio
/// samplers, and the identifiers of the shared uniform block.
pub const RESERVED_NAMES: &[&str] = &[
    "iMouse",
    "iMouseDown",
    "iResolution",
    "iTime",
    "iFrame",
    "iNumGeomIters",
    "iSoundR",
    "iSoundL",
    "iFreqR",
    "iFreqL",
    "PassUniforms",
    "pass",
    "pass_sampler",
    "main",
];

const GLSL_KEYWORDS: &[&str] = &[
    "attribute",
    "const",
    "uniform",
    "varying",
    "buffer",
    "shared",
    "layout",
    "centroid",
    "flat",
    "smooth",
    "noperspective",
    "patch",
    "sample",
    "break",
    "continue",
    "do",
    "for",
    "while",
    "switch",
    "case",
    "default",
    "if",
    "else",
    "subroutine",
    "in",
    "out",
    "inout",
    "float",
    "double",
    "int",
    "uint",
    "void",
    "bool",
    "true",
    "false",
    "invariant",
    "precise",
    "discard",
    "return",
    "struct",
    "lowp",
    "mediump",
    "highp",
    "precision",
    "vec2",
    "vec3",
    "vec4",
    "ivec2",
    "ivec3",
    "ivec4",
    "uvec2",
    "uvec3",
    "uvec4",
    "bvec2",
    "bvec3",
    "bvec4",
    "mat2",
    "mat3",
    "mat4",
    "sampler",
    "sampler1D",
    "sampler2D",
    "sampler3D",
    "texture1D",
    "texture2D",
    "texture3D",
    "coherent",
    "volatile",
    "restrict",
    "readonly",
    "writeonly",
];

/// Suffix of the texture declared for every sampler slot.
const TEXTURE_SUFFIX: &str = "_texture";

/// One off-screen buffer rendered by its own shader program.
///
/// Its index among user buffers is its position in [`ShaderConfig::buffers`];
/// that index selects the program, the render target, and the sampler unit
/// other passes read it from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BufferDescriptor {
    pub name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Track the window size instead of `width`/`height`.
    #[serde(default)]
    pub is_window_size: bool,
    #[serde(default)]
    pub clear_color: [f32; 3],
    /// Number of points drawn by the pass.
    #[serde(default = "default_geom_iters")]
    pub geom_iters: u32,
}

impl BufferDescriptor {
    pub fn window_sized(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: 0,
            height: 0,
            is_window_size: true,
            clear_color: [0.0; 3],
            geom_iters: default_geom_iters(),
        }
    }

    pub fn fixed(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            is_window_size: false,
            clear_color: [0.0; 3],
            geom_iters: default_geom_iters(),
        }
    }

    pub fn with_geom_iters(mut self, geom_iters: u32) -> Self {
        self.geom_iters = geom_iters;
        self
    }

    pub fn with_clear_color(mut self, clear_color: [f32; 3]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Size the buffer renders at for the given window dimensions.
    pub fn effective_size(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        if self.is_window_size {
            (window_width, window_height)
        } else {
            (self.width, self.height)
        }
    }
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self::window_sized("image")
    }
}

/// A user uniform; the number of values selects float, vec2, vec3 or vec4.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UniformDefinition {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f32>,
}

impl UniformDefinition {
    pub fn new(name: impl Into<String>, values: impl Into<Vec<f32>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ShaderConfig {
    #[serde(default)]
    pub buffers: Vec<BufferDescriptor>,
    /// Buffer indices in execution order. Entries may repeat or leave a
    /// buffer out; the order is taken as given.
    #[serde(default)]
    pub render_order: Vec<usize>,
    #[serde(default)]
    pub uniforms: Vec<UniformDefinition>,
    #[serde(default)]
    pub blend: bool,
    #[serde(default)]
    pub image: BufferDescriptor,
}

impl ShaderConfig {
    pub fn buffer(&self, index: usize) -> Option<&BufferDescriptor> {
        self.buffers.get(index)
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let count = self.buffers.len();
        for (position, &index) in self.render_order.iter().enumerate() {
            if index >= count {
                return Err(ConfigError::RenderOrderOutOfRange {
                    position,
                    index,
                    count,
                });
            }
        }

        for buffer in &self.buffers {
            if !buffer.is_window_size && (buffer.width == 0 || buffer.height == 0) {
                return Err(ConfigError::ZeroSize {
                    name: buffer.name.clone(),
                    width: buffer.width,
                    height: buffer.height,
                });
            }
        }

        let mut seen = BTreeMap::new();
        check_names(
            &mut seen,
            "buffer",
            self.buffers.iter().map(|b| b.name.as_str()),
        )?;
        check_names(
            &mut seen,
            "uniform",
            self.uniforms.iter().map(|u| u.name.as_str()),
        )?;
        Ok(())
    }

    /// Buffers that appear more than once in the render order, with their
    /// number of appearances.
    pub fn repeated_buffers(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for &index in &self.render_order {
            *counts.entry(index).or_insert(0usize) += 1;
        }
        counts.retain(|_, count| *count > 1);
        counts
    }

    /// Buffers that never appear in the render order.
    pub fn unused_buffers(&self) -> Vec<usize> {
        let ordered: BTreeSet<usize> = self.render_order.iter().copied().collect();
        (0..self.buffers.len())
            .filter(|index| !ordered.contains(index))
            .collect()
    }
}

/// Buffer and uniform names share one namespace in the generated shader, so
/// `seen` spans both kinds.
fn check_names<'a>(
    seen: &mut BTreeMap<&'a str, &'static str>,
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    for (position, name) in names.enumerate() {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName { kind, position });
        }
        if !is_identifier(name) {
            return Err(ConfigError::InvalidName {
                kind,
                name: name.to_string(),
            });
        }
        if RESERVED_NAMES.contains(&name) || GLSL_KEYWORDS.contains(&name) {
            return Err(ConfigError::ReservedName {
                kind,
                name: name.to_string(),
            });
        }
        if let Some(&first) = seen.get(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                first,
                name: name.to_string(),
            });
        }
        seen.insert(name, kind);
    }
    Ok(())
}

/// `[A-Za-z][A-Za-z0-9_]*`, minus the forms GLSL or the prelude claim: a
/// leading underscore (block members), `__`, `gl_`, and the texture suffix.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.contains("__")
        && !name.starts_with("gl_")
        && !name.ends_with(TEXTURE_SUFFIX)
}

fn default_geom_iters() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "buffers": [
            { "name": "trail", "is_window_size": true, "geom_iters": 1024, "clear_color": [0.1, 0.0, 0.2] },
            { "name": "history", "width": 512, "height": 1 }
        ],
        "render_order": [1, 0],
        "uniforms": [
            { "name": "uGain", "values": [0.75] },
            { "name": "uCenter", "values": [0.5, 0.5] }
        ],
        "blend": true,
        "image": { "name": "image", "is_window_size": true, "geom_iters": 3 }
    }"#;

    fn two_buffers() -> ShaderConfig {
        ShaderConfig {
            buffers: vec![
                BufferDescriptor::window_sized("a"),
                BufferDescriptor::fixed("b", 64, 64),
            ],
            render_order: vec![0, 1],
            ..Default::default()
        }
    }

    #[test]
    fn parses_sample_config() {
        let config: ShaderConfig = serde_json::from_str(SAMPLE).expect("parse config");
        config.validate().expect("valid config");

        assert_eq!(config.num_buffers(), 2);
        assert_eq!(config.render_order, vec![1, 0]);
        assert!(config.blend);
        assert_eq!(config.buffers[0].geom_iters, 1024);
        assert_eq!(config.buffers[1].geom_iters, 1);
        assert_eq!(config.buffers[1].clear_color, [0.0; 3]);
        assert_eq!(config.uniforms[1].arity(), 2);
        assert_eq!(config.image.geom_iters, 3);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ShaderConfig = serde_json::from_str("{}").expect("parse config");
        assert!(config.buffers.is_empty());
        assert!(!config.blend);
        assert!(config.image.is_window_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn effective_size_tracks_window_only_when_flagged() {
        let config = two_buffers();
        assert_eq!(config.buffers[0].effective_size(800, 600), (800, 600));
        assert_eq!(config.buffers[1].effective_size(800, 600), (64, 64));
    }

    #[test]
    fn rejects_out_of_range_render_order() {
        let mut config = two_buffers();
        config.render_order = vec![0, 2];
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RenderOrderOutOfRange {
                position: 1,
                index: 2,
                count: 2
            }
        ));
    }

    #[test]
    fn allows_repeated_and_skipped_buffers() {
        let mut config = two_buffers();
        config.buffers.push(BufferDescriptor::fixed("c", 8, 8));
        config.render_order = vec![0, 0, 1];

        assert!(config.validate().is_ok());
        assert_eq!(config.repeated_buffers().get(&0), Some(&2));
        assert_eq!(config.repeated_buffers().len(), 1);
        assert_eq!(config.unused_buffers(), vec![2]);
    }

    #[test]
    fn rejects_zero_sized_fixed_buffer() {
        let mut config = two_buffers();
        config.buffers[1].height = 0;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("'b'"));
    }

    #[test]
    fn rejects_duplicate_uniform_names() {
        let mut config = two_buffers();
        config.uniforms = vec![
            UniformDefinition::new("uGain", [1.0]),
            UniformDefinition::new("uGain", [2.0]),
        ];
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateName {
                kind: "uniform",
                first: "uniform",
                ..
            }
        ));
    }

    #[test]
    fn buffer_and_uniform_share_one_namespace() {
        let mut config = two_buffers();
        config.uniforms = vec![UniformDefinition::new("a", [1.0])];
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateName {
                kind: "uniform",
                first: "buffer",
                ref name,
            } if name == "a"
        ));
    }

    #[test]
    fn rejects_builtin_and_prelude_names() {
        for name in ["iTime", "iSoundL", "pass", "pass_sampler", "vec3"] {
            let mut config = two_buffers();
            config.buffers[0].name = name.to_string();
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::ReservedName { kind: "buffer", .. }),
                "{name} accepted: {err:?}"
            );
        }

        let mut config = two_buffers();
        config.uniforms = vec![UniformDefinition::new("iMouse", [0.0, 0.0])];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ReservedName {
                kind: "uniform",
                ..
            }
        ));
    }

    #[test]
    fn rejects_names_that_are_not_identifiers() {
        for name in [
            "my buffer",
            "2pass",
            "_hidden",
            "a__b",
            "gl_Color",
            "trail_texture",
            "uGain;",
        ] {
            let mut config = two_buffers();
            config.uniforms = vec![UniformDefinition::new(name, [1.0])];
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidName { kind: "uniform", .. }),
                "{name} accepted: {err:?}"
            );
        }
    }

    #[test]
    fn accepts_ordinary_identifiers() {
        let mut config = two_buffers();
        config.buffers[0].name = "trail2".into();
        config.uniforms = vec![
            UniformDefinition::new("uGain", [1.0]),
            UniformDefinition::new("u_center_xy", [0.5, 0.5]),
        ];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_arity_is_not_a_validation_error() {
        let mut config = two_buffers();
        config.uniforms = vec![
            UniformDefinition::new("uEmpty", Vec::new()),
            UniformDefinition::new("uWide", [1.0, 2.0, 3.0, 4.0, 5.0]),
        ];
        assert!(config.validate().is_ok());
    }
}
