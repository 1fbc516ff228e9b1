use std::collections::btree_map::Entry;
use std::fs;
use std::path::Path;

use cadblocks_core::{
    drawing::{BlockDefinition, Drawing, Entity},
    geometry::Point,
};
use serde_json::Value;
use thiserror::Error;

const BINARY_SENTINEL: &str = "AutoCAD Binary DXF";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

/// ASCII DXF 读取入口，仅解析 ENTITIES 与 BLOCKS 段。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        if source.starts_with(BINARY_SENTINEL) {
            return Err(IoError::UnsupportedFeature(
                "二进制 DXF 暂不支持".to_string(),
            ));
        }
        DxfParser::new(source).parse().map_err(|err| match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        })
    }

    /// 以 UTF-8 解码上传内容，非法字节替换为 U+FFFD。
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Drawing, IoError> {
        let text = String::from_utf8_lossy(bytes);
        self.parse_str(&text)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&data)
    }
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Drawing, DxfError> {
        let mut drawing = Drawing::new();
        let mut sections = 0usize;
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    sections += 1;
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "ENTITIES" => self.parse_entities(&mut drawing)?,
                        "BLOCKS" => self.parse_blocks(&mut drawing)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        if sections == 0 {
            return Err(DxfError::invalid("文件中未找到任何 SECTION"));
        }
        Ok(drawing)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "SEQEND" => self.skip_entity_body()?,
                kind => {
                    let entity = self.parse_entity(kind)?;
                    drawing.add_entity(entity);
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    let definition = self.parse_block_definition()?;
                    drawing.add_block_definition(definition);
                }
                _ => {
                    // 未预期的条目（例如孤立的 ENDBLK），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<BlockDefinition, DxfError> {
        let mut name: Option<String> = None;
        let mut flags: i32 = 0;
        let mut base_point = PointSlot::default();
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    "SEQEND" => self.skip_entity_body()?,
                    kind => entities.push(self.parse_entity(kind)?),
                },
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    3 => {
                        if name.is_none() {
                            name = Some(value.trim().to_string());
                        }
                    }
                    70 => flags = parse_i32(&value, "BLOCK 标志（组码 70）")?,
                    10 | 20 | 30 => base_point.assign(code, &value, "BLOCK 基点")?,
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = match name {
            Some(name) => name,
            None => return Err(DxfError::invalid("BLOCK 缺少名称（组码 2）")),
        };

        Ok(BlockDefinition {
            name,
            // 非零标志作为块声明类型透出，零值视为未声明。
            kind: (flags != 0).then(|| flags.to_string()),
            base_point: base_point.finish("BLOCK 基点")?,
            entities,
        })
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        let mut builder = EntityBuilder::new(kind);
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => builder.accept(code, &value)?,
                None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
            }
        }
        if builder.layout == FieldLayout::Polyline {
            self.parse_vertex_sequence(&mut builder)?;
        }
        builder.finish()
    }

    /// POLYLINE 之后的 VERTEX 记录直到 SEQEND。
    fn parse_vertex_sequence(&mut self, builder: &mut EntityBuilder) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => {
                        if let Some(point) = self.parse_vertex_record()? {
                            builder.vertices.push(point);
                        }
                    }
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value))?;
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }

    fn parse_vertex_record(&mut self) -> Result<Option<Point>, DxfError> {
        let mut position = PointSlot::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code @ (10 | 20 | 30), value)) => {
                    position.assign(code, &value, "VERTEX 坐标")?;
                }
                Some(_) => {}
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }
        position.finish("VERTEX 坐标")
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 按实体类型决定哪些组码解释为几何字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldLayout {
    Line,
    Circle,
    Arc,
    Ellipse,
    LwPolyline,
    Polyline,
    Spline,
    /// 3DFACE / SOLID / TRACE：最多四个角点。
    Corners,
    /// LEADER：顶点序列。
    VertexList,
    Generic,
}

impl FieldLayout {
    fn for_kind(kind: &str) -> Self {
        match kind {
            "LINE" => FieldLayout::Line,
            "CIRCLE" => FieldLayout::Circle,
            "ARC" => FieldLayout::Arc,
            "ELLIPSE" => FieldLayout::Ellipse,
            "LWPOLYLINE" => FieldLayout::LwPolyline,
            "POLYLINE" => FieldLayout::Polyline,
            "SPLINE" => FieldLayout::Spline,
            "3DFACE" | "SOLID" | "TRACE" => FieldLayout::Corners,
            "LEADER" => FieldLayout::VertexList,
            _ => FieldLayout::Generic,
        }
    }
}

struct EntityBuilder {
    layout: FieldLayout,
    entity: Entity,
    start: PointSlot,
    end: PointSlot,
    center: PointSlot,
    corners: [PointSlot; 4],
    points: PointList,
    fit_points: PointList,
    vertices: Vec<Point>,
}

impl EntityBuilder {
    fn new(kind: &str) -> Self {
        Self {
            layout: FieldLayout::for_kind(kind),
            entity: Entity::new(kind),
            start: PointSlot::default(),
            end: PointSlot::default(),
            center: PointSlot::default(),
            corners: Default::default(),
            points: PointList::default(),
            fit_points: PointList::default(),
            vertices: Vec::new(),
        }
    }

    fn accept(&mut self, code: i32, raw: &str) -> Result<(), DxfError> {
        match code {
            5 => self.entity.handle = Some(raw.trim().to_string()),
            8 => self.entity.layer = Some(raw.trim().to_string()),
            _ => {
                if !self.accept_geometry(code, raw)? {
                    self.push_extra(code, raw);
                }
            }
        }
        Ok(())
    }

    /// 返回 `true` 表示该组码已被解释为几何字段。
    fn accept_geometry(&mut self, code: i32, raw: &str) -> Result<bool, DxfError> {
        let kind = self.entity.kind.as_str();
        match (self.layout, code) {
            (FieldLayout::Line, 10 | 20 | 30) => self.start.assign(code, raw, "LINE 起点")?,
            (FieldLayout::Line, 11 | 21 | 31) => self.end.assign(code - 1, raw, "LINE 终点")?,
            (
                FieldLayout::Circle | FieldLayout::Arc | FieldLayout::Ellipse,
                10 | 20 | 30,
            ) => self.center.assign(code, raw, &format!("{kind} 圆心"))?,
            (FieldLayout::Circle | FieldLayout::Arc, 40) => {
                self.entity.radius = Some(parse_f64(raw, &format!("{kind} 半径（组码 40）"))?);
            }
            (FieldLayout::Arc, 50) => {
                self.entity.start_angle =
                    Some(parse_f64(raw, "ARC 起始角（组码 50）")?.to_radians());
            }
            (FieldLayout::Arc, 51) => {
                self.entity.end_angle =
                    Some(parse_f64(raw, "ARC 终止角（组码 51）")?.to_radians());
            }
            (FieldLayout::LwPolyline, 10 | 20) => {
                self.points.accept(code, raw, "LWPOLYLINE 顶点")?;
            }
            (FieldLayout::LwPolyline | FieldLayout::Polyline | FieldLayout::Spline, 70) => {
                let flags = parse_i32(raw, &format!("{kind} 标志（组码 70）"))?;
                self.entity.closed = Some(flags & 0x01 == 0x01);
            }
            (FieldLayout::Spline, 10 | 20 | 30) => {
                self.points.accept(code, raw, "SPLINE 控制点")?;
            }
            (FieldLayout::Spline, 11 | 21 | 31) => {
                self.fit_points.accept(code - 1, raw, "SPLINE 拟合点")?;
            }
            (FieldLayout::Spline, 71) => {
                self.entity.degree = Some(parse_i32(raw, "SPLINE 阶数（组码 71）")?);
            }
            (FieldLayout::Corners, 10..=13 | 20..=23 | 30..=33) => {
                let index = (code % 10) as usize;
                let context = format!("{kind} 角点 {index}");
                self.corners[index].assign(code - index as i32, raw, &context)?;
            }
            (FieldLayout::VertexList, 10 | 20 | 30) => {
                self.points.accept(code, raw, &format!("{kind} 顶点"))?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// 未解释的组码按组码保存；重复出现的组码收集为数组。
    fn push_extra(&mut self, code: i32, raw: &str) {
        let value = group_value(code, raw);
        match self.entity.extra.entry(code.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }

    fn finish(self) -> Result<Entity, DxfError> {
        let EntityBuilder {
            layout,
            mut entity,
            start,
            end,
            center,
            corners,
            points,
            fit_points,
            vertices,
        } = self;
        let kind = entity.kind.clone();
        match layout {
            FieldLayout::Line => {
                entity.start = start.finish("LINE 起点")?;
                entity.end = end.finish("LINE 终点")?;
            }
            FieldLayout::Circle | FieldLayout::Arc | FieldLayout::Ellipse => {
                entity.center = center.finish(&format!("{kind} 圆心"))?;
            }
            FieldLayout::LwPolyline | FieldLayout::VertexList => {
                entity.vertices = non_empty(points.finish(&format!("{kind} 顶点"))?);
            }
            FieldLayout::Polyline => {
                entity.vertices = non_empty(vertices);
            }
            FieldLayout::Spline => {
                entity.control_points = non_empty(points.finish("SPLINE 控制点")?);
                let fit_points = fit_points.finish("SPLINE 拟合点")?;
                if !fit_points.is_empty() {
                    let encoded = fit_points.iter().copied().map(point_value).collect();
                    entity
                        .extra
                        .insert("fitPoints".to_string(), Value::Array(encoded));
                }
            }
            FieldLayout::Corners => {
                let mut collected = Vec::new();
                for (index, corner) in corners.into_iter().enumerate() {
                    if let Some(point) = corner.finish(&format!("{kind} 角点 {index}"))? {
                        collected.push(point);
                    }
                }
                entity.vertices = non_empty(collected);
            }
            FieldLayout::Generic => {}
        }
        Ok(entity)
    }
}

/// 单个点的 X/Y/Z 分量，组码 10/20/30 对应三个轴。
#[derive(Debug, Default, Clone, Copy)]
struct PointSlot {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl PointSlot {
    fn assign(&mut self, code: i32, raw: &str, context: &str) -> Result<(), DxfError> {
        let slot = match code {
            10 => &mut self.x,
            20 => &mut self.y,
            30 => &mut self.z,
            other => {
                return Err(DxfError::invalid(format!(
                    "{context} 使用了无法识别的坐标组码 {other}"
                )));
            }
        };
        assign_coord(slot, raw, context)
    }

    fn finish(self, context: &str) -> Result<Option<Point>, DxfError> {
        match (self.x, self.y, self.z) {
            (None, None, None) => Ok(None),
            (Some(x), Some(y), z) => Ok(Some(Point { x, y, z })),
            _ => Err(DxfError::invalid(format!("{context} 缺少完整的 XY 坐标"))),
        }
    }
}

/// 点序列：每个 X（组码 10）开启一个新点，随后的 Y/Z 补全该点。
#[derive(Debug, Default)]
struct PointList {
    points: Vec<PointSlot>,
}

impl PointList {
    fn accept(&mut self, code: i32, raw: &str, context: &str) -> Result<(), DxfError> {
        if code == 10 {
            let mut slot = PointSlot::default();
            slot.assign(code, raw, context)?;
            self.points.push(slot);
            return Ok(());
        }
        match self.points.last_mut() {
            Some(slot) => slot.assign(code, raw, context),
            None => Err(DxfError::invalid(format!(
                "{context} 在定义 X（组码 10）之前出现组码 {code}"
            ))),
        }
    }

    fn finish(self, context: &str) -> Result<Vec<Point>, DxfError> {
        let mut points = Vec::with_capacity(self.points.len());
        for slot in self.points {
            match slot.finish(context)? {
                Some(point) => points.push(point),
                None => {
                    return Err(DxfError::invalid(format!("{context} 存在空的坐标记录")));
                }
            }
        }
        Ok(points)
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    /// 读取下一对（组码, 值），跳过 999 注释。
    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        loop {
            let code_line = match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    line
                }
                None => return Ok(None),
            };
            if code_line.trim().is_empty() && self.line_number > 1 {
                // 文件末尾的空行
                if self.lines.clone().all(|rest| rest.trim().is_empty()) {
                    return Ok(None);
                }
            }

            let value_line = match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    line
                }
                None => {
                    return Err(DxfError::invalid(format!(
                        "文件在第 {} 行结束，缺少与组码对应的值行",
                        self.line_number
                    )));
                }
            };

            let code = code_line.trim().parse::<i32>().map_err(|_| {
                DxfError::invalid(format!(
                    "第 {} 行的组码 \"{}\" 无法解析为整数",
                    self.line_number - 1,
                    code_line.trim()
                ))
            })?;
            if code == 999 {
                continue;
            }
            let value = value_line.trim_end_matches('\r').to_string();
            return Ok(Some((code, value)));
        }
    }

    fn put_back(&mut self, pair: (i32, String)) -> Result<(), DxfError> {
        if self.buffer.is_some() {
            return Err(DxfError::unsupported("内部错误：尝试多次回退 DXF pair"));
        }
        self.buffer = Some(pair);
        Ok(())
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn non_empty(points: Vec<Point>) -> Option<Vec<Point>> {
    if points.is_empty() { None } else { Some(points) }
}

fn point_value(point: Point) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("x".to_string(), Value::from(point.x));
    object.insert("y".to_string(), Value::from(point.y));
    if let Some(z) = point.z {
        object.insert("z".to_string(), Value::from(z));
    }
    Value::Object(object)
}

/// 按 DXF 组码范围推断值类型：浮点、整数，其余保留原始字符串。
fn group_value(code: i32, raw: &str) -> Value {
    let trimmed = raw.trim();
    let typed = match code {
        10..=59 | 110..=149 | 210..=239 | 460..=469 | 1010..=1059 => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::from),
        60..=99
        | 160..=179
        | 270..=299
        | 370..=389
        | 400..=409
        | 420..=429
        | 440..=459
        | 1060..=1071 => trimmed.parse::<i64>().ok().map(Value::from),
        _ => None,
    };
    typed.unwrap_or_else(|| Value::String(raw.to_string()))
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}
