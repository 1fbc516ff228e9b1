pub mod coordinates;

pub mod geometry {
    use serde::{Deserialize, Serialize};

    /// 图纸中的点，Z 分量仅在源数据提供时存在（2D 图元不写出 `z`）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point {
        pub x: f64,
        pub y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub z: Option<f64>,
    }

    impl Point {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self { x, y, z: None }
        }

        #[inline]
        pub fn with_z(x: f64, y: f64, z: f64) -> Self {
            Self { x, y, z: Some(z) }
        }

        /// 缺省 Z 视为 0。
        #[inline]
        pub fn z_or_zero(self) -> f64 {
            self.z.unwrap_or(0.0)
        }

        #[inline]
        pub fn is_3d(self) -> bool {
            self.z.is_some()
        }
    }

}

pub mod drawing {
    use std::collections::BTreeMap;

    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use crate::geometry::Point;

    /// 解析器产出的松散实体：`type` 之外的几何字段均可缺失。
    ///
    /// 未被解释的组码保存在 `extra` 中（键为组码或语义名），
    /// 保证原样透传时不丢失源数据。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Entity {
        #[serde(rename = "type")]
        pub kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub handle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub layer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub start: Option<Point>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub end: Option<Point>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub center: Option<Point>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub radius: Option<f64>,
        /// 弧度。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub start_angle: Option<f64>,
        /// 弧度。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub end_angle: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub vertices: Option<Vec<Point>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub closed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub control_points: Option<Vec<Point>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub degree: Option<i32>,
        #[serde(flatten)]
        pub extra: BTreeMap<String, Value>,
    }

    impl Entity {
        pub fn new(kind: impl Into<String>) -> Self {
            Self {
                kind: kind.into(),
                ..Self::default()
            }
        }
    }

    /// 图纸中的命名块定义。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        /// 块声明的类型，缺失时由入库逻辑回退为 `BLOCK`。
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        pub kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub base_point: Option<Point>,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                ..Self::default()
            }
        }
    }

    /// 解析后的图纸：顶层实体序列 + 按出现顺序保存的块定义。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Drawing {
        entities: Vec<Entity>,
        blocks: IndexMap<String, BlockDefinition>,
    }

    impl Drawing {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: Entity) {
            self.entities.push(entity);
        }

        /// 同名块覆盖旧定义，但保留其首次出现的位置。
        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn entities(&self) -> &[Entity] {
            &self.entities
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = (&str, &BlockDefinition)> {
            self.blocks.iter().map(|(name, block)| (name.as_str(), block))
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn block_count(&self) -> usize {
            self.blocks.len()
        }
    }

}
