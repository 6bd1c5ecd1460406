//! HTML rendering of the assembled report.

use super::assembler::{AssembledSection, REPORT_TITLE, ReportMetadata, UNAVAILABLE};
use crate::narrative::Narrative;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Event, Options, Parser};

const STYLE: &str = "
    * { box-sizing: border-box; }
    body {
        font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
        line-height: 1.6;
        color: #333;
        background: #f5f5f5;
        margin: 0;
        padding: 20px;
    }
    .container {
        max-width: 1200px;
        margin: 0 auto;
        background: white;
        padding: 40px;
        box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        border-radius: 8px;
    }
    h1 { color: #1a73e8; padding-bottom: 15px; border-bottom: 3px solid #1a73e8; }
    h2 { color: #34495e; margin-top: 30px; }
    .metadata {
        background: #e8f4f8;
        padding: 15px;
        border-radius: 5px;
        margin-bottom: 30px;
        border-left: 4px solid #1a73e8;
    }
    .metadata p { margin: 5px 0; font-size: 0.95em; }
    .notice {
        background: #fff4e5;
        border-left: 4px solid #f0a020;
        padding: 10px 15px;
        margin-bottom: 20px;
    }
    .unavailable { color: #888; font-style: italic; }
    figure.chart {
        margin: 30px 0;
        padding: 20px;
        background: #fafafa;
        border-radius: 8px;
        border: 1px solid #e0e0e0;
    }
    figure.chart iframe { width: 100%; height: 520px; border: none; }
    figcaption { color: #555; font-size: 0.9em; }
    table { width: 100%; border-collapse: collapse; margin: 20px 0; }
    th, td { padding: 12px; text-align: left; border: 1px solid #ddd; }
    th { background-color: #1a73e8; color: white; }
    tr:nth-child(even) { background-color: #f9f9f9; }
    footer { margin-top: 60px; padding-top: 20px; border-top: 1px solid #ddd; text-align: center; color: #777; font-size: 0.9em; }
";

/// Convert narrative Markdown to HTML.
///
/// Raw HTML in the Markdown is escaped and shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut out, parser);
    out
}

pub(super) fn render(narrative: &Narrative, sections: &[AssembledSection], metadata: &ReportMetadata) -> String {
    let page: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (REPORT_TITLE) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                div class="container" {
                    h1 { (REPORT_TITLE) }
                    div class="metadata" {
                        @for (label, value) in metadata.banner() {
                            p { strong { (label) ":" } " " (value) }
                        }
                    }
                    @if !metadata.warnings.is_empty() {
                        div class="notice" {
                            strong { "Warnings" }
                            ul {
                                @for warning in &metadata.warnings {
                                    li { (warning) }
                                }
                            }
                        }
                    }
                    @if let Some(reason) = narrative.degraded_reason() {
                        div class="notice" {
                            strong { "Narrative unavailable: " } (reason)
                        }
                    }
                    @if !narrative.preamble().is_empty() {
                        div class="narrative preamble" {
                            (PreEscaped(markdown_to_html(narrative.preamble())))
                        }
                    }
                    @for section in sections {
                        section id=(section.section.anchor()) {
                            h2 { (section.section.title()) }
                            @match &section.body {
                                Some(body) => {
                                    div class="narrative" { (PreEscaped(markdown_to_html(body))) }
                                }
                                None => {
                                    p class="unavailable" { (UNAVAILABLE) }
                                }
                            }
                            @for chart in &section.charts {
                                figure class="chart" id=(format!("chart-{}", chart.id)) {
                                    iframe src=(chart.relative_path) title=(chart.title) loading="lazy" {}
                                    figcaption {
                                        strong { (chart.title) } " - " (chart.caption)
                                    }
                                }
                            }
                        }
                    }
                    footer {
                        p { "This report was automatically generated using AI-powered analysis." }
                    }
                }
            }
        }
    };
    page.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_tables_and_emphasis() {
        let html = markdown_to_html("**Bold**\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<strong>Bold</strong>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn test_markdown_headings() {
        let html = markdown_to_html("### Regional detail\nAsia led.");
        assert!(html.contains("<h3>Regional detail</h3>"));
        assert!(html.contains("<p>Asia led.</p>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = markdown_to_html("Sales rose <script>alert(1)</script> sharply.\n\n<div onclick=\"steal()\">Asia</div>\n");
        assert!(!html.contains("<script"));
        assert!(!html.contains("<div"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("&lt;div onclick="));
        assert!(html.contains("Sales rose"));
    }
}
