use serde::Serialize;
use std::str::FromStr;
use strum::{Display, EnumString};

use crate::models::job::RenderOptions;

/// Named PDF paper sizes.
#[derive(Debug, Clone, Copy, Default, Serialize, EnumString, Display, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Paper width and height in inches.
    pub fn dimensions_in(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (8.27, 11.69),
            PageSize::Letter => (8.5, 11.0),
        }
    }
}

/// Output document format resolved from a job's options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pdf {
        page_size: PageSize,
        print_background: bool,
    },
    Png,
    Docx,
}

impl OutputFormat {
    /// Resolve the export format. Unrecognized values fall back to an A4 PDF.
    pub fn from_options(options: &RenderOptions) -> Self {
        let print_background = options.print_background.unwrap_or(false);
        let requested = options.format.as_deref().map(str::trim).unwrap_or_default();

        if requested.eq_ignore_ascii_case("png") {
            OutputFormat::Png
        } else if requested.eq_ignore_ascii_case("docx") {
            OutputFormat::Docx
        } else {
            OutputFormat::Pdf {
                page_size: PageSize::from_str(requested).unwrap_or_default(),
                print_background,
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf { .. } => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Docx => "docx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Pdf { .. } => "application/pdf",
            OutputFormat::Png => "image/png",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}
