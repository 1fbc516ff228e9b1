//! 实体归一化：把开放的 CAD 实体词汇映射为封闭、可存储的坐标记录。
//!
//! 每个输入实体恰好产生一条记录。已识别类型缺少必需几何信息时，
//! 退回到动态提取分支（部分记录），仍无可用几何时原样保存在 `raw` 下。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::drawing::Entity;
use crate::geometry::Point;

pub const LINE: &str = "LINE";
pub const CIRCLE: &str = "CIRCLE";
pub const ARC: &str = "ARC";
pub const LWPOLYLINE: &str = "LWPOLYLINE";
pub const POLYLINE: &str = "POLYLINE";
pub const SPLINE: &str = "SPLINE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolylineKind {
    Lightweight,
    Classic,
}

impl PolylineKind {
    #[inline]
    pub fn tag(self) -> &'static str {
        match self {
            PolylineKind::Lightweight => LWPOLYLINE,
            PolylineKind::Classic => POLYLINE,
        }
    }
}

/// 归一化后的坐标记录，序列化时以 `type` 字段区分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RecordWire", try_from = "RecordWire")]
pub enum CoordinateRecord {
    Line {
        from: Point,
        to: Point,
    },
    Circle {
        center: Point,
        radius: f64,
    },
    Arc {
        center: Point,
        radius: f64,
        start_angle: Option<f64>,
        end_angle: Option<f64>,
    },
    Polyline {
        kind: PolylineKind,
        vertices: Vec<Point>,
        closed: Option<bool>,
    },
    Spline {
        control_points: Vec<Point>,
        degree: Option<i32>,
    },
    /// 动态提取结果，至少携带一种几何；`endpoints` 总是成对出现。
    Partial {
        kind: String,
        endpoints: Option<(Point, Point)>,
        vertices: Option<Vec<Point>>,
        center: Option<Point>,
    },
    /// 无法提取任何几何时保留整个源实体。
    Raw(Box<Entity>),
}

impl CoordinateRecord {
    /// 记录的 `type` 标签。
    pub fn kind(&self) -> &str {
        match self {
            CoordinateRecord::Line { .. } => LINE,
            CoordinateRecord::Circle { .. } => CIRCLE,
            CoordinateRecord::Arc { .. } => ARC,
            CoordinateRecord::Polyline { kind, .. } => kind.tag(),
            CoordinateRecord::Spline { .. } => SPLINE,
            CoordinateRecord::Partial { kind, .. } => kind,
            CoordinateRecord::Raw(entity) => &entity.kind,
        }
    }

    #[inline]
    pub fn is_raw(&self) -> bool {
        matches!(self, CoordinateRecord::Raw(_))
    }
}

/// 归一化单个实体。该函数对任何输入都有结果，不会失败。
pub fn normalize_entity(entity: &Entity) -> CoordinateRecord {
    let recognized = match entity.kind.as_str() {
        LINE => match (entity.start, entity.end) {
            (Some(from), Some(to)) => Some(CoordinateRecord::Line { from, to }),
            _ => None,
        },
        CIRCLE => entity.center.map(|center| CoordinateRecord::Circle {
            center,
            radius: radius_or_zero(entity.radius),
        }),
        ARC => entity.center.map(|center| CoordinateRecord::Arc {
            center,
            radius: radius_or_zero(entity.radius),
            start_angle: entity.start_angle,
            end_angle: entity.end_angle,
        }),
        LWPOLYLINE | POLYLINE => {
            let kind = if entity.kind == LWPOLYLINE {
                PolylineKind::Lightweight
            } else {
                PolylineKind::Classic
            };
            entity
                .vertices
                .as_ref()
                .map(|vertices| CoordinateRecord::Polyline {
                    kind,
                    vertices: vertices.clone(),
                    closed: entity.closed,
                })
        }
        // 样条缺少控制点时直接原样保存，不做动态提取。
        SPLINE => Some(match &entity.control_points {
            Some(control_points) => CoordinateRecord::Spline {
                control_points: control_points.clone(),
                degree: entity.degree.filter(|degree| *degree != 0),
            },
            None => raw_passthrough(entity),
        }),
        _ => None,
    };
    recognized.unwrap_or_else(|| extract_dynamic(entity))
}

/// 归一化实体序列，输出与输入等长且保持顺序。
pub fn normalize_entities(entities: &[Entity]) -> Vec<CoordinateRecord> {
    entities.iter().map(normalize_entity).collect()
}

fn extract_dynamic(entity: &Entity) -> CoordinateRecord {
    let endpoints = entity.start.zip(entity.end);
    let vertices = entity.vertices.clone();
    let center = entity.center;
    if endpoints.is_none() && vertices.is_none() && center.is_none() {
        return raw_passthrough(entity);
    }
    CoordinateRecord::Partial {
        kind: entity.kind.clone(),
        endpoints,
        vertices,
        center,
    }
}

fn raw_passthrough(entity: &Entity) -> CoordinateRecord {
    debug!(kind = %entity.kind, handle = ?entity.handle, "未能提取几何信息，保留原始实体");
    CoordinateRecord::Raw(Box::new(entity.clone()))
}

#[inline]
fn radius_or_zero(radius: Option<f64>) -> f64 {
    radius.filter(|value| !value.is_nan()).unwrap_or(0.0)
}

/// 存储格式：所有变体共用的扁平结构。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertices: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    center: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_points: Option<Vec<Point>>,
    /// 外层 `None` 表示字段缺失，`Some(None)` 写出为 `null`。
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    degree: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Box<Entity>>,
}

impl RecordWire {
    fn tagged(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: None,
            to: None,
            vertices: None,
            center: None,
            radius: None,
            start_angle: None,
            end_angle: None,
            closed: None,
            control_points: None,
            degree: None,
            raw: None,
        }
    }
}

fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i32>::deserialize(deserializer).map(Some)
}

impl From<CoordinateRecord> for RecordWire {
    fn from(record: CoordinateRecord) -> Self {
        let mut wire = RecordWire::tagged(record.kind());
        match record {
            CoordinateRecord::Line { from, to } => {
                wire.from = Some(from);
                wire.to = Some(to);
            }
            CoordinateRecord::Circle { center, radius } => {
                wire.center = Some(center);
                wire.radius = Some(radius);
            }
            CoordinateRecord::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                wire.center = Some(center);
                wire.radius = Some(radius);
                wire.start_angle = start_angle;
                wire.end_angle = end_angle;
            }
            CoordinateRecord::Polyline {
                vertices, closed, ..
            } => {
                wire.vertices = Some(vertices);
                wire.closed = closed;
            }
            CoordinateRecord::Spline {
                control_points,
                degree,
            } => {
                wire.control_points = Some(control_points);
                wire.degree = Some(degree);
            }
            CoordinateRecord::Partial {
                endpoints,
                vertices,
                center,
                ..
            } => {
                if let Some((from, to)) = endpoints {
                    wire.from = Some(from);
                    wire.to = Some(to);
                }
                wire.vertices = vertices;
                wire.center = center;
            }
            CoordinateRecord::Raw(entity) => {
                wire.raw = Some(entity);
            }
        }
        wire
    }
}

/// 存储文档无法还原为任何记录变体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecodeError {
    kind: String,
    reason: &'static str,
}

impl fmt::Display for RecordDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid `{}` coordinate record: {}", self.kind, self.reason)
    }
}

impl std::error::Error for RecordDecodeError {}

impl TryFrom<RecordWire> for CoordinateRecord {
    type Error = RecordDecodeError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let RecordWire {
            kind,
            from,
            to,
            mut vertices,
            center,
            radius,
            start_angle,
            end_angle,
            closed,
            control_points,
            degree,
            raw,
        } = wire;

        if let Some(entity) = raw {
            return Ok(CoordinateRecord::Raw(entity));
        }

        let recognized = match kind.as_str() {
            LINE => from
                .zip(to)
                .map(|(from, to)| CoordinateRecord::Line { from, to }),
            CIRCLE => center.map(|center| CoordinateRecord::Circle {
                center,
                radius: radius.unwrap_or(0.0),
            }),
            ARC => center.map(|center| CoordinateRecord::Arc {
                center,
                radius: radius.unwrap_or(0.0),
                start_angle,
                end_angle,
            }),
            LWPOLYLINE => vertices.take().map(|vertices| CoordinateRecord::Polyline {
                kind: PolylineKind::Lightweight,
                vertices,
                closed,
            }),
            POLYLINE => vertices.take().map(|vertices| CoordinateRecord::Polyline {
                kind: PolylineKind::Classic,
                vertices,
                closed,
            }),
            SPLINE => control_points.map(|control_points| CoordinateRecord::Spline {
                control_points,
                degree: degree.flatten(),
            }),
            _ => None,
        };
        if let Some(record) = recognized {
            return Ok(record);
        }

        let endpoints = match (from, to) {
            (Some(from), Some(to)) => Some((from, to)),
            (None, None) => None,
            _ => {
                return Err(RecordDecodeError {
                    kind,
                    reason: "`from` and `to` must appear together",
                });
            }
        };
        if endpoints.is_none() && vertices.is_none() && center.is_none() {
            return Err(RecordDecodeError {
                kind,
                reason: "no geometry and no raw entity",
            });
        }
        Ok(CoordinateRecord::Partial {
            kind,
            endpoints,
            vertices,
            center,
        })
    }
}
