//! A CLI tool for rendering a DICOM image file
//! into a general purpose image file (e.g. PNG),
//! through its modality and VOI transforms.
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dicom_object::{open_file, InMemDicomObject};
use dicom_transform::transform::color::is_monochrome;
use dicom_transform::{
    attribute, read_image, DrawBitmap, Image, ModalityVoiLut, Region, Transform, TransformsChain,
    VoiLut,
};
use snafu::{OptionExt, Report, ResultExt, Whatever};
use tracing::{debug, error, Level};

/// Render a DICOM file into an image
#[derive(Debug, Parser)]
struct App {
    /// Path to the DICOM file to render
    file: PathBuf,

    /// Path to the output image
    /// (default is to replace input extension with `.png`)
    #[arg(short = 'o', long = "out")]
    output: Option<PathBuf>,

    /// Frame number (0-indexed)
    #[arg(short = 'F', long = "frame", default_value = "0")]
    frame_number: u32,

    /// Window center
    #[arg(long = "center", requires = "width", allow_negative_numbers = true)]
    center: Option<f64>,

    /// Window width
    #[arg(long = "width", requires = "center")]
    width: Option<f64>,

    /// Use a window enclosing all values of the frame
    #[arg(long = "optimal", conflicts_with_all = ["center", "lut"])]
    optimal: bool,

    /// Use the VOI LUT at this index of the VOI LUT Sequence
    #[arg(long = "lut", conflicts_with = "center")]
    lut: Option<usize>,

    /// Skip the modality transform
    #[arg(long = "no-modality")]
    no_modality: bool,

    /// Print more information about the image and the output file
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// How the VOI transform is chosen.
#[derive(Debug, Copy, Clone, PartialEq)]
enum VoiChoice {
    Window { center: f64, width: f64 },
    Optimal,
    Lut(usize),
    FromDataset,
}

fn main() {
    let App {
        file,
        output,
        frame_number,
        center,
        width,
        optimal,
        lut,
        no_modality,
        verbose,
    } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let output = output.unwrap_or_else(|| {
        let mut path = file.clone();
        path.set_extension("png");
        path
    });

    let voi = match (center.zip(width), optimal, lut) {
        (Some((center, width)), _, _) => VoiChoice::Window { center, width },
        (None, true, _) => VoiChoice::Optimal,
        (None, false, Some(index)) => VoiChoice::Lut(index),
        (None, false, None) => VoiChoice::FromDataset,
    };

    let obj = open_file(&file).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });

    let image = read_image(&obj, frame_number).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-2);
    });

    if verbose {
        println!(
            "{}x{} {} image, {} with high bit {}",
            image.width(),
            image.height(),
            image.color_space(),
            image.depth(),
            image.high_bit()
        );
    }

    let dynamic_image = build_pipeline(&obj, &image, voi, !no_modality)
        .and_then(|chain| {
            DrawBitmap::new(Some(Arc::new(chain)))
                .to_dynamic_image(&image)
                .whatever_context("Could not render image")
        })
        .unwrap_or_else(|e| {
            error!("{}", Report::from_error(e));
            std::process::exit(-3);
        });

    dynamic_image.save(&output).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-4);
    });

    if verbose {
        println!("Image saved to {}", output.display());
    }
}

/// Build the chain of modality and VOI transforms for the image.
///
/// Color images are left untouched.
fn build_pipeline(
    obj: &InMemDicomObject,
    image: &Image,
    voi: VoiChoice,
    modality: bool,
) -> Result<TransformsChain, Whatever> {
    let mut chain = TransformsChain::new();
    if !is_monochrome(image.color_space()) {
        debug!("{} image, no VOI applied", image.color_space());
        return Ok(chain);
    }

    let modality = if modality {
        ModalityVoiLut::from_dataset(obj).whatever_context("Could not read modality LUT")?
    } else {
        ModalityVoiLut::from_rescale(Default::default())
    };

    let voi = match voi {
        VoiChoice::Window { center, width } => {
            VoiLut::with_center_width(center, width).whatever_context("Invalid window")?
        }
        VoiChoice::Optimal => {
            let rescaled = modality
                .apply(image)
                .whatever_context("Could not apply modality LUT")?;
            let mut voi = VoiLut::new();
            voi.apply_optimal_voi(&rescaled, Region::full(&rescaled))
                .whatever_context("Could not compute optimal window")?;
            voi
        }
        VoiChoice::Lut(index) => {
            let lut = attribute::voi_luts(obj)
                .whatever_context("Could not read VOI LUT sequence")?
                .into_iter()
                .nth(index)
                .whatever_context(format!("No VOI LUT at index {}", index))?;
            VoiLut::with_lut(Arc::new(lut))
        }
        VoiChoice::FromDataset => {
            VoiLut::from_dataset(obj).whatever_context("Could not read VOI attributes")?
        }
    };

    if let Some(window) = voi.window_level() {
        debug!("window center {}, width {}", window.center, window.width);
    } else if let Some(lut) = voi.lut() {
        debug!("VOI LUT {:?} with {} entries", lut.description(), lut.size());
    }

    if !modality.is_empty() {
        chain.add_transform(Arc::new(modality));
    }
    chain.add_transform(Arc::new(voi));
    Ok(chain)
}
