use std::io::{self, Write};
use tui_banner::{Align, Banner, Fill, Gradient, Palette};

pub fn print_banner() {
    let Ok(banner) = Banner::new("mediabatch") else {
        return;
    };

    let banner = banner
        .gradient(Gradient::diagonal(Palette::from_hex(&[
            "#00FFFF",
            "#0080FF",
            "#8000FF",
            "#FF00FF",
        ])))
        .fill(Fill::Keep)
        .align(Align::Left)
        .padding(0);

    println!("{}", banner.render());
    println!(
        "  {} {}",
        console::style("Batch Media Downloader").white().bold(),
        console::style("• yt-dlp • Concurrent • Smart fallback").dim()
    );
    println!();

    let _ = io::stdout().flush();
}
