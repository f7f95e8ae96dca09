//! Answer capture: one implementation per answer-entry control.
//!
//! Every variant renders an input control bound to the stable field
//! identifier, exposes the entry tip shown next to the control, the
//! correct-answer text for review mode, any client-side parameters the
//! control needs, and (when the control has a visual review affordance) a
//! preview location marker.

use std::collections::BTreeMap;

use regex::Regex;

use crate::domain::{field_name, prior_file_field, AnswerType};
use crate::util::{encode_uri_component, escape_attr};

/// Extensions offered an inline image toggle.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "png", "bmp", "jpe"];
/// Extensions offered an embedded document-viewer toggle.
const DOC_EXTENSIONS: &[&str] = &["doc", "docx", "pdf", "xls", "xlsx", "ppt", "pptx"];

pub struct AnswerBoxParams<'a> {
  pub qn: usize,
  pub part: usize,
  pub multi: bool,
  /// The student's recorded answer for this part, empty if none.
  pub last_answer: &'a str,
  pub prompt: Option<&'a str>,
  pub correct_answer: &'a str,
  /// Realized options, choice controls only.
  pub choices: &'a [String],
  /// Base URL previously uploaded files are served from.
  pub file_base_url: &'a str,
}

#[derive(Clone, Debug, Default)]
pub struct RenderedBox {
  pub control: String,
  pub tip: String,
  pub correct_answer: String,
  pub client_params: BTreeMap<String, serde_json::Value>,
  /// Element id of the preview affordance, empty when the control has none.
  pub preview: String,
}

pub trait AnswerBox {
  fn generate(&self, params: &AnswerBoxParams<'_>) -> RenderedBox;
}

/// Dispatch on the part's declared answer type.
pub fn answer_box_for(kind: AnswerType) -> &'static dyn AnswerBox {
  match kind {
    AnswerType::Number | AnswerType::Text => &TextEntryBox,
    AnswerType::Choice => &MultipleChoiceBox,
    AnswerType::FileUpload => &FileUploadBox,
  }
}

pub struct TextEntryBox;

impl AnswerBox for TextEntryBox {
  fn generate(&self, p: &AnswerBoxParams<'_>) -> RenderedBox {
    let field = field_name(p.qn, p.multi, p.part);
    let mut out = String::new();
    if let Some(prompt) = p.prompt {
      out.push_str(&format!("<label for=\"{}\">{}</label>", field, prompt));
    }
    out.push_str(&format!(
      "<input type=\"text\" name=\"{f}\" id=\"{f}\" value=\"{v}\" />",
      f = field,
      v = escape_attr(p.last_answer)
    ));
    RenderedBox {
      control: out,
      tip: "Enter your answer".into(),
      correct_answer: p.correct_answer.to_string(),
      ..Default::default()
    }
  }
}

pub struct MultipleChoiceBox;

impl AnswerBox for MultipleChoiceBox {
  fn generate(&self, p: &AnswerBoxParams<'_>) -> RenderedBox {
    let field = field_name(p.qn, p.multi, p.part);
    let mut out = String::new();
    if let Some(prompt) = p.prompt {
      out.push_str(&format!("<span id=\"label-{}\">{}</span>", field, prompt));
    }
    for (i, choice) in p.choices.iter().enumerate() {
      let checked = if p.last_answer == i.to_string() {
        " checked=\"checked\""
      } else {
        ""
      };
      out.push_str(&format!(
        "<label><input type=\"radio\" name=\"{f}\" value=\"{i}\"{c} /> {t}</label>",
        f = field,
        i = i,
        c = checked,
        t = choice
      ));
    }
    let mut client_params = BTreeMap::new();
    client_params.insert("choices".into(), serde_json::json!(p.choices.len()));
    RenderedBox {
      control: out,
      tip: "Select the best answer".into(),
      correct_answer: p.correct_answer.to_string(),
      client_params,
      ..Default::default()
    }
  }
}

pub struct FileUploadBox;

impl AnswerBox for FileUploadBox {
  fn generate(&self, p: &AnswerBoxParams<'_>) -> RenderedBox {
    let field = field_name(p.qn, p.multi, p.part);
    let mut out = String::new();
    let mut preview = String::new();
    if let Some(prompt) = p.prompt {
      out.push_str(&format!("<label for=\"{}\">{}</label>", field, prompt));
    }
    out.push_str(&format!(
      "<input type=\"file\" name=\"{f}\" id=\"{f}\" />\n",
      f = field
    ));

    let la = p.last_answer;
    if !la.is_empty() {
      if la.starts_with("Error") {
        // A failed-upload marker, not a file reference. Show it verbatim.
        out.push_str(&format!("<br/>{}", la));
      } else {
        let token_re = Regex::new(r"@FILE:(.+?)@").expect("file token pattern");
        let file = token_re.replace(la, "$1").into_owned();
        let url = format!("{}/{}", p.file_base_url.trim_end_matches('/'), file);
        let extension = file.rsplit('.').next().unwrap_or("").to_lowercase();
        let filename = file.rsplit('/').next().unwrap_or(&file);
        out.push_str(&format!(
          "<br/>Last file uploaded: <a href=\"{u}\" target=\"_blank\">{n}</a>",
          u = url,
          n = filename
        ));
        // Re-submitting without a new upload keeps the old file.
        out.push_str(&format!(
          "<input type=\"hidden\" name=\"{f}\" value=\"{v}\" />",
          f = prior_file_field(p.qn, p.multi, p.part),
          v = escape_attr(&file)
        ));
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
          let img_id = format!("img-{}", field);
          out.push_str(&format!(
            " <span aria-expanded=\"false\" aria-controls=\"{img}\" class=\"clickable\" id=\"filetog-{f}\">[+]</span>",
            img = img_id,
            f = field
          ));
          out.push_str(&format!(
            "<br/><div><img id=\"{img}\" style=\"display:none;max-width:80%;\" aria-hidden=\"true\" src=\"{u}\" alt=\"Student uploaded image\"/></div>",
            img = img_id,
            u = url
          ));
          preview = img_id;
        } else if DOC_EXTENSIONS.contains(&extension.as_str()) {
          let frame_id = format!("fileprev-{}", field);
          out.push_str(&format!(
            " <span aria-expanded=\"false\" aria-controls=\"{fr}\" class=\"clickable\" id=\"filetog-{f}\">[+]</span>",
            fr = frame_id,
            f = field
          ));
          out.push_str(&format!(
            "<br/><iframe id=\"{fr}\" style=\"display:none;\" aria-hidden=\"true\" src=\"https://docs.google.com/viewer?url={u}&embedded=true\" width=\"80%\" height=\"600px\"></iframe>",
            fr = frame_id,
            u = encode_uri_component(&url)
          ));
          preview = frame_id;
        }
      }
    }

    RenderedBox {
      control: out,
      tip: "Select a file to upload".into(),
      correct_answer: p.correct_answer.to_string(),
      preview,
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params<'a>(last: &'a str, base: &'a str) -> AnswerBoxParams<'a> {
    AnswerBoxParams {
      qn: 0,
      part: 0,
      multi: false,
      last_answer: last,
      prompt: None,
      correct_answer: "42",
      choices: &[],
      file_base_url: base,
    }
  }

  #[test]
  fn text_entry_redisplays_and_escapes_the_last_answer() {
    let rendered = TextEntryBox.generate(&params("a\"b", "/files"));
    assert!(rendered.control.contains("name=\"qn0\""));
    assert!(rendered.control.contains("value=\"a&quot;b\""));
    assert_eq!(rendered.tip, "Enter your answer");
    assert_eq!(rendered.correct_answer, "42");
  }

  #[test]
  fn choice_box_checks_the_recorded_option() {
    let choices = vec!["red".to_string(), "blue".to_string()];
    let mut p = params("1", "/files");
    p.choices = &choices;
    let rendered = MultipleChoiceBox.generate(&p);
    assert!(rendered
      .control
      .contains("value=\"1\" checked=\"checked\" /> blue"));
    assert!(!rendered.control.contains("value=\"0\" checked"));
    assert_eq!(rendered.client_params["choices"], serde_json::json!(2));
  }

  #[test]
  fn upload_error_marker_is_redisplayed_verbatim() {
    let rendered = FileUploadBox.generate(&params("Error: file too large", "/files"));
    assert!(rendered.control.contains("<br/>Error: file too large"));
    assert!(!rendered.control.contains("Last file uploaded"));
    assert!(rendered.preview.is_empty());
  }

  #[test]
  fn upload_token_resolves_link_hidden_field_and_image_preview() {
    let rendered = FileUploadBox.generate(&params("@FILE:work/scan.png@", "/files/"));
    assert!(rendered
      .control
      .contains("<a href=\"/files/work/scan.png\" target=\"_blank\">scan.png</a>"));
    assert!(rendered
      .control
      .contains("name=\"lf0\" value=\"work/scan.png\""));
    assert!(rendered.control.contains("<img id=\"img-qn0\""));
    assert_eq!(rendered.preview, "img-qn0");
  }

  #[test]
  fn upload_documents_get_an_embedded_viewer() {
    let rendered = FileUploadBox.generate(&params("@FILE:notes.pdf@", "/files"));
    assert!(rendered.control.contains("docs.google.com/viewer?url=%2Ffiles%2Fnotes.pdf"));
    assert_eq!(rendered.preview, "fileprev-qn0");
  }

  #[test]
  fn multipart_fields_use_the_composite_id() {
    let mut p = params("", "/files");
    p.qn = 2;
    p.part = 1;
    p.multi = true;
    let rendered = TextEntryBox.generate(&p);
    assert!(rendered.control.contains("name=\"qn3001\""));
  }
}
