use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::{Array, Array4};

/// 调整图像大小以适应模型输入
///
/// 使用双线性插值将图像精确缩放到指定尺寸，不保持宽高比。
///
/// # 参数
/// * `img` - 原始图像
/// * `width` - 目标宽度
/// * `height` - 目标高度
///
/// # 返回值
/// 返回调整大小后的图像
///
/// # 示例
///
/// ```
/// use image::{DynamicImage, GenericImageView};
/// use roadwatch::detect::prevs::resize_image;
///
/// let img = DynamicImage::new_rgb8(1280, 720); // 示例图像
/// let resized = resize_image(&img, 320, 320);
/// assert_eq!(resized.dimensions(), (320, 320));
/// ```
pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    img.resize_exact(width, height, FilterType::Triangle)
}

/// 将图像转换为模型输入张量
///
/// 1. 归一化像素值到[0, 1]范围
/// 2. 通道顺序为RGB
/// 3. 维度顺序为NCHW，batch为1
///
/// # 参数
/// * `img` - 已缩放到模型输入尺寸的图像
/// * `input_height` - 输入图像高度
/// * `input_width` - 输入图像宽度
///
/// # 返回值
/// 返回形状为(1, 3, height, width)的四维张量
///
/// # 示例
///
/// ```
/// use image::DynamicImage;
/// use roadwatch::detect::prevs::image_to_tensor;
///
/// let img = DynamicImage::new_rgb8(320, 320);
/// let tensor = image_to_tensor(&img, 320, 320);
/// assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
/// ```
pub fn image_to_tensor(img: &DynamicImage, input_height: usize, input_width: usize) -> Array4<f32> {
    let mut tensor = Array::zeros((1, 3, input_height, input_width));

    for (x, y, pixel) in img.to_rgb8().enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= input_width || y >= input_height {
            continue;
        }
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y, x]] = (r as f32) / 255.0;
        tensor[[0, 1, y, x]] = (g as f32) / 255.0;
        tensor[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    tensor
}

/// 缩放并转换为模型输入，同时返回缩放后的图像用于绘制
///
/// # 示例
///
/// ```
/// use image::DynamicImage;
/// use roadwatch::detect::prepare_input;
///
/// let frame = DynamicImage::new_rgb8(1920, 1080);
/// let (resized, tensor) = prepare_input(&frame, 320);
/// assert_eq!((resized.width(), resized.height()), (320, 320));
/// assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
/// ```
pub fn prepare_input(img: &DynamicImage, input_size: u32) -> (DynamicImage, Array4<f32>) {
    let resized = resize_image(img, input_size, input_size);
    let tensor = image_to_tensor(&resized, input_size as usize, input_size as usize);
    (resized, tensor)
}
