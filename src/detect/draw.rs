use image::{DynamicImage, GenericImageView, ImageBuffer};
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};

use crate::detect::bounds::DetectionSet;
use crate::error::DetectError;

/// 按类别循环使用的框颜色
const PALETTE: [SolidSource; 4] = [
    SolidSource { r: 0x00, g: 0xFF, b: 0x00, a: 0xFF }, // 绿色
    SolidSource { r: 0x00, g: 0xFF, b: 0xFF, a: 0xFF }, // 青色
    SolidSource { r: 0xFF, g: 0x00, b: 0x00, a: 0xFF }, // 红色
    SolidSource { r: 0xFF, g: 0xFF, b: 0x00, a: 0xFF }, // 黄色
];

fn class_color(class_id: usize) -> SolidSource {
    PALETTE[class_id % PALETTE.len()]
}

/// FPS文字颜色
const LABEL_COLOR: SolidSource = SolidSource { r: 0xFF, g: 0xFF, b: 0xFF, a: 0xFF };

/// 七段字形的单字宽高（像素）
const GLYPH_WIDTH: f32 = 6.0;
const GLYPH_HEIGHT: f32 = 10.0;
const GLYPH_ADVANCE: f32 = 10.0;

/// 在图像上绘制检测结果
///
/// 检测框坐标必须与`image`处于同一坐标系（即模型输入尺寸）。
///
/// # 参数
/// * `image` - 模型输入尺寸的图像
/// * `detections` - 检测结果
///
/// # 返回值
/// 返回绘制了检测框的图像
pub fn draw_detections(image: &DynamicImage, detections: &DetectionSet) -> Result<DynamicImage, DetectError> {
    let mut dt = to_draw_target(image);

    for detection in detections {
        let bbox = &detection.bbox;

        let mut pb = PathBuilder::new();
        pb.rect(bbox.x1, bbox.y1, bbox.width(), bbox.height());
        let path = pb.finish();

        dt.stroke(
            &path,
            &Source::Solid(class_color(detection.class_id)),
            &StrokeStyle {
                join: LineJoin::Round,
                width: 2.0,
                ..StrokeStyle::default()
            },
            &DrawOptions::default(),
        );
    }

    from_draw_target(&dt, image.dimensions())
}

/// 在图像左上角绘制 `FPS:xx.x`
///
/// 用七段笔画绘制，不依赖字体。
///
/// # 参数
/// * `image` - 显示尺寸的图像
/// * `fps` - 当前帧率
pub fn draw_fps(image: &DynamicImage, fps: f32) -> Result<DynamicImage, DetectError> {
    let mut dt = to_draw_target(image);
    let text = format!("FPS:{fps:.1}");
    let (x0, y0) = (6.0, 6.0);

    // 黑底保证文字在任何画面上可见
    let mut bg = PathBuilder::new();
    bg.rect(x0 - 4.0, y0 - 4.0, text.len() as f32 * GLYPH_ADVANCE + 6.0, GLYPH_HEIGHT + 8.0);
    dt.fill(&bg.finish(), &Source::Solid(SolidSource { r: 0, g: 0, b: 0, a: 0xFF }), &DrawOptions::new());

    let mut pb = PathBuilder::new();
    for (i, ch) in text.chars().enumerate() {
        glyph_path(&mut pb, ch, x0 + i as f32 * GLYPH_ADVANCE, y0);
    }
    dt.stroke(
        &pb.finish(),
        &Source::Solid(LABEL_COLOR),
        &StrokeStyle { width: 2.0, ..StrokeStyle::default() },
        &DrawOptions::default(),
    );

    from_draw_target(&dt, image.dimensions())
}

/// 七段编码，位0到位6依次为 上、右上、右下、下、左下、左上、中
fn segments(ch: char) -> u8 {
    match ch {
        '0' => 0b011_1111,
        '1' => 0b000_0110,
        '2' => 0b101_1011,
        '3' => 0b100_1111,
        '4' => 0b110_0110,
        '5' | 'S' => 0b110_1101,
        '6' => 0b111_1101,
        '7' => 0b000_0111,
        '8' => 0b111_1111,
        '9' => 0b110_1111,
        'F' => 0b111_0001,
        'P' => 0b111_0011,
        _ => 0,
    }
}

fn glyph_path(pb: &mut PathBuilder, ch: char, x: f32, y: f32) {
    let (w, h, mid) = (GLYPH_WIDTH, GLYPH_HEIGHT, GLYPH_HEIGHT / 2.0);
    match ch {
        '.' => pb.rect(x + w / 2.0 - 1.0, y + h - 1.0, 2.0, 2.0),
        ':' => {
            pb.rect(x + w / 2.0 - 1.0, y + 2.0, 2.0, 2.0);
            pb.rect(x + w / 2.0 - 1.0, y + h - 3.0, 2.0, 2.0);
        }
        _ => {
            let lines = [
                ((x, y), (x + w, y)),
                ((x + w, y), (x + w, y + mid)),
                ((x + w, y + mid), (x + w, y + h)),
                ((x, y + h), (x + w, y + h)),
                ((x, y + mid), (x, y + h)),
                ((x, y), (x, y + mid)),
                ((x, y + mid), (x + w, y + mid)),
            ];
            let mask = segments(ch);
            for (bit, ((x1, y1), (x2, y2))) in lines.into_iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    pb.move_to(x1, y1);
                    pb.line_to(x2, y2);
                }
            }
        }
    }
}

/// RGBA图像转为raqote的BGRA绘制目标
fn to_draw_target(image: &DynamicImage) -> DrawTarget {
    let (img_width, img_height) = image.dimensions();
    let mut dt = DrawTarget::new(img_width as i32, img_height as i32);

    let rgba_image = image.to_rgba8();
    let image_data: Vec<u32> = rgba_image
        .chunks(4)
        .map(|pixel| u32::from_le_bytes([pixel[2], pixel[1], pixel[0], pixel[3]]))
        .collect();

    let img = raqote::Image {
        width: img_width as i32,
        height: img_height as i32,
        data: &image_data,
    };
    dt.draw_image_at(0.0, 0.0, &img, &DrawOptions::new());
    dt
}

/// BGRA转回RGBA
fn from_draw_target(dt: &DrawTarget, (width, height): (u32, u32)) -> Result<DynamicImage, DetectError> {
    let pixels: Vec<u8> = dt
        .get_data()
        .iter()
        .flat_map(|&pixel| {
            let bytes = pixel.to_le_bytes();
            [bytes[2], bytes[1], bytes[0], bytes[3]]
        })
        .collect();

    ImageBuffer::from_raw(width, height, pixels)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| DetectError::Render("绘制结果尺寸不匹配".to_string()))
}
