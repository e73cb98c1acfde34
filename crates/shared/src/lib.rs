use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Уникальный идентификатор объекта в документе
pub type ObjectId = String;

/// Тип примитива (размеры в миллиметрах)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    /// Параллелепипед, угол в начале координат
    Box {
        length: f64,
        width: f64,
        height: f64,
    },
    /// Цилиндр вдоль оси Z, основание в z = 0
    Cylinder {
        radius: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    /// Усечённый конус; radius2 = 0 даёт острую вершину
    Cone {
        radius1: f64,
        radius2: f64,
        height: f64,
    },
}

impl Primitive {
    /// Тип объекта в стиле моделировщика ("Part::Box" и т.д.)
    pub fn type_id(&self) -> &'static str {
        match self {
            Primitive::Box { .. } => "Part::Box",
            Primitive::Cylinder { .. } => "Part::Cylinder",
            Primitive::Sphere { .. } => "Part::Sphere",
            Primitive::Cone { .. } => "Part::Cone",
        }
    }
}

/// Тип CSG-операции
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    Union,
    Difference,
    Intersection,
}

impl BooleanOp {
    pub fn type_id(&self) -> &'static str {
        match self {
            BooleanOp::Union => "Part::MultiFuse",
            BooleanOp::Difference => "Part::Cut",
            BooleanOp::Intersection => "Part::MultiCommon",
        }
    }
}

/// Трансформация объекта (поворот в градусах)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Положение камеры: глаз, цель, вектор "вверх", вертикальный угол обзора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub eye: [f64; 3],
    pub target: [f64; 3],
    #[serde(default = "CameraPose::default_up")]
    pub up: [f64; 3],
    /// Вертикальный угол обзора в градусах
    #[serde(default = "CameraPose::default_fov")]
    pub fov_degrees: f64,
}

impl CameraPose {
    fn default_up() -> [f64; 3] {
        [0.0, 0.0, 1.0]
    }

    fn default_fov() -> f64 {
        45.0
    }

    pub fn looking_at(eye: [f64; 3], target: [f64; 3]) -> Self {
        Self {
            eye,
            target,
            up: Self::default_up(),
            fov_degrees: Self::default_fov(),
        }
    }
}

impl Default for CameraPose {
    /// Изометрический вид на начало координат (ось Z вверх)
    fn default() -> Self {
        Self::looking_at([150.0, -150.0, 120.0], [0.0, 0.0, 0.0])
    }
}

// ── Протокол инструментов ─────────────────────────────────────

/// Запрос от удалённого агента: одна JSON-строка.
///
/// Принимаются обе формы: `{"tool": ..., "arguments": ...}` и
/// `{"method": ..., "params": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(alias = "method")]
    pub tool: String,
    #[serde(default, alias = "params")]
    pub arguments: Value,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Ответ на запрос: `success` плюс поля результата или `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolResponse {
    /// Успешный ответ; поля объекта `data` поднимаются на верхний уровень
    pub fn ok_with(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            error: None,
            data,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

// ── Измерения ─────────────────────────────────────────────────

/// Снимок точки измерения для ответа агенту
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSnapshot {
    pub id: String,
    pub grid_cell: String,
    /// None, если луч не попал в геометрию
    pub position: Option<[f64; 3]>,
    pub resolved: bool,
    pub confirmed: bool,
}

/// Описание текущей сетки выбора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub columns: u32,
    pub rows: u32,
    pub generation: u64,
    /// Область вьюпорта [x, y, ширина, высота] в долях от 0 до 1
    pub region: [f64; 4],
    pub zoomed: bool,
}

// ── Сравнение ─────────────────────────────────────────────────

/// Результат сравнения текущей геометрии с эталонной сеткой
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub hausdorff_distance: f64,
    pub is_match: bool,
    pub tolerance: f64,
    pub reference_volume: f64,
    pub current_volume: f64,
    pub volume_error: f64,
    pub reference_area: f64,
    pub current_area: f64,
    pub area_error: f64,
    pub reference_points: usize,
    pub current_points: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_serde_tag() {
        let json = r#"{"type": "box", "length": 50.0, "width": 30.0, "height": 20.0}"#;
        let p: Primitive = serde_json::from_str(json).unwrap();
        assert_eq!(
            p,
            Primitive::Box {
                length: 50.0,
                width: 30.0,
                height: 20.0
            }
        );
        assert_eq!(p.type_id(), "Part::Box");
    }

    #[test]
    fn test_transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.scale, [1.0, 1.0, 1.0]);
        assert_eq!(t, Transform::new());
    }

    #[test]
    fn test_request_accepts_method_params() {
        let req: ToolRequest =
            serde_json::from_str(r#"{"method": "select_point", "params": {"grid_cell": "C4"}}"#)
                .unwrap();
        assert_eq!(req.tool, "select_point");
        assert_eq!(req.arguments["grid_cell"], "C4");
    }

    #[test]
    fn test_request_arguments_optional() {
        let req: ToolRequest = serde_json::from_str(r#"{"tool": "list_points"}"#).unwrap();
        assert_eq!(req.tool, "list_points");
        assert!(req.arguments.is_null());
    }

    #[test]
    fn test_response_flattens_data() {
        let resp = ToolResponse::ok_with(serde_json::json!({ "distance": 12.5 }));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["distance"], 12.5);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_response_error_shape() {
        let json = serde_json::to_value(ToolResponse::err("Unknown point: point_9")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Unknown point: point_9");
    }

    #[test]
    fn test_camera_pose_defaults() {
        let pose: CameraPose =
            serde_json::from_str(r#"{"eye": [0, -100, 0], "target": [0, 0, 0]}"#).unwrap();
        assert_eq!(pose.up, [0.0, 0.0, 1.0]);
        assert_eq!(pose.fov_degrees, 45.0);
    }
}
