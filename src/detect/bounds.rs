/// 中心点形式的边界框
///
/// 模型直接输出的格式：中心点坐标和宽高，单位为模型输入像素。
#[derive(Debug, Clone, Default, Copy, PartialEq)]
pub struct CenterBox {
    /// 中心x坐标
    pub cx: f32,
    /// 中心y坐标
    pub cy: f32,
    /// 宽度
    pub w: f32,
    /// 高度
    pub h: f32,
}

impl CenterBox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// 转换为左上角/右下角形式
    ///
    /// 不校验宽高的符号，负宽高会得到退化的边界框，由NMS的面积计算兜底。
    pub fn to_corner_form(&self) -> BoundingBox {
        let half_w = self.w / 2.0;
        let half_h = self.h / 2.0;
        BoundingBox {
            x1: self.cx - half_w,
            y1: self.cy - half_h,
            x2: self.cx + half_w,
            y2: self.cy + half_h,
        }
    }
}

/// 边界框结构
///
/// 表示一个矩形边界框，用于包围检测到的目标。
#[derive(Debug, Clone, Default, Copy, PartialEq)]
pub struct BoundingBox {
    /// 左上角x坐标
    pub x1: f32,
    /// 左上角y坐标
    pub y1: f32,
    /// 右下角x坐标
    pub x2: f32,
    /// 右下角y坐标
    pub y2: f32,
}

impl BoundingBox {
    /// 创建一个新的边界框
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 计算边界框的宽度
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// 计算边界框的高度
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 按像素包含约定计算面积：(x2 - x1 + 1) * (y2 - y1 + 1)，每条边不小于0
    pub fn pixel_area(&self) -> f32 {
        (self.width() + 1.0).max(0.0) * (self.height() + 1.0).max(0.0)
    }

    /// 检查边界框是否有效（宽度和高度都不为负）
    pub fn is_valid(&self) -> bool {
        self.width() >= 0.0 && self.height() >= 0.0
    }

    /// 还原为中心点形式
    pub fn to_center_form(&self) -> CenterBox {
        CenterBox {
            cx: (self.x1 + self.x2) / 2.0,
            cy: (self.y1 + self.y2) / 2.0,
            w: self.width(),
            h: self.height(),
        }
    }
}

/// 检测结果结构
///
/// 分数为候选框的objectness，类别在NMS过程中不会被改写。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Detection {
    /// 目标的边界框（模型输入坐标）
    pub bbox: BoundingBox,
    /// 置信度
    pub score: f32,
    /// 类别ID，对应标签表下标
    pub class_id: usize,
}

impl Detection {
    /// 创建一个新的检测结果
    pub fn new(bbox: BoundingBox, score: f32, class_id: usize) -> Self {
        Self { bbox, score, class_id }
    }
}

/// 单帧的检测结果集合
///
/// 每帧新建，交给报警判定和绘制后丢弃，不跨帧保留。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    /// 创建一个空的检测结果集合
    pub fn new() -> Self {
        Self { detections: Vec::new() }
    }

    /// 向集合中添加一个新的检测结果
    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    /// 返回集合中检测结果的数量
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// 检查集合是否为空
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// 获取集合中所有检测结果的切片引用
    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    /// 根据索引获取检测结果的引用
    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    /// 提供只读迭代器
    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// 指定类别的检测结果
    pub fn of_class(&self, class_id: usize) -> impl Iterator<Item = &Detection> + '_ {
        self.detections.iter().filter(move |d| d.class_id == class_id)
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self { detections: iter.into_iter().collect() }
    }
}
