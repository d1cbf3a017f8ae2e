//! Scraping of the SII "situación tributaria" result page.
//!
//! The page is old, loosely formed HTML. Rather than building a DOM we scan
//! for the data table and read it row by row: the first cell holds a label,
//! the second its value.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::taxpayer::TaxpayerRecord;
use crate::rut::Rut;

lazy_static! {
    static ref TABLE_CUADRO: Regex = Regex::new(
        r#"(?is)<table\b[^>]*\bclass\s*=\s*["']?[^"'>]*\bcuadro\b[^>]*>(.*?)</table\s*>"#
    ).unwrap();

    static ref TABLE_ANY: Regex = Regex::new(
        r"(?is)<table\b[^>]*>(.*?)</table\s*>"
    ).unwrap();

    // Rows are split on their opening tag; closing tags are often missing.
    static ref ROW_START: Regex = Regex::new(r"(?i)<tr\b[^>]*>").unwrap();

    static ref CELL: Regex = Regex::new(
        r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]\s*>"
    ).unwrap();

    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();

    static ref ENTITY: Regex = Regex::new(r"&(#\d+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Which record field a row label maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    LegalName,
    BusinessActivity,
    EconomicActivity,
    Address,
    Commune,
    Region,
}

/// Label keywords, checked in order against the folded label.
const LABELS: [(&str, Field); 8] = [
    ("razon social", Field::LegalName),
    ("nombre", Field::LegalName),
    ("giro", Field::BusinessActivity),
    ("actividad", Field::EconomicActivity),
    ("direccion", Field::Address),
    ("domicilio", Field::Address),
    ("comuna", Field::Commune),
    ("region", Field::Region),
];

/// Parse a registry result page into a record for `rut`.
///
/// Returns `None` when the page has no table or no legal name; both mean
/// the registry does not know the taxpayer.
pub fn parse_taxpayer_page(html: &str, rut: Rut, now: DateTime<Utc>) -> Option<TaxpayerRecord> {
    let Some(table) = find_data_table(html) else {
        warn!("No table found in registry response for {}", rut);
        return None;
    };

    let mut legal_name = None;
    let mut business_activity = None;
    let mut economic_activity = None;
    let mut address = None;
    let mut commune = None;
    let mut region = None;

    for (label, value) in table_rows(table) {
        let Some(field) = classify_label(&label) else {
            continue;
        };
        debug!("Registry row {:?}: {:?} = {:?}", field, label, value);

        let slot = match field {
            Field::LegalName => &mut legal_name,
            Field::BusinessActivity => &mut business_activity,
            Field::EconomicActivity => &mut economic_activity,
            Field::Address => &mut address,
            Field::Commune => &mut commune,
            Field::Region => &mut region,
        };
        *slot = Some(value).filter(|v: &String| !v.is_empty());
    }

    let Some(legal_name) = legal_name else {
        warn!("Registry response for {} has no legal name", rut);
        return None;
    };

    Some(TaxpayerRecord {
        identifier: rut,
        legal_name,
        business_activity,
        economic_activity,
        address,
        commune,
        region,
        last_verified_at: now,
    })
}

/// The `cuadro` table if present, else the first table.
fn find_data_table(html: &str) -> Option<&str> {
    TABLE_CUADRO
        .captures(html)
        .or_else(|| TABLE_ANY.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// `(label, value)` pairs for every row with at least two cells.
fn table_rows(table: &str) -> Vec<(String, String)> {
    ROW_START
        .split(table)
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<String> = CELL
                .captures_iter(row)
                .map(|cell| cell_text(&cell[1]))
                .collect();
            if cells.len() < 2 {
                return None;
            }
            let mut cells = cells.into_iter();
            Some((cells.next()?, cells.next()?))
        })
        .collect()
}

fn classify_label(label: &str) -> Option<Field> {
    let folded = fold(label);
    LABELS
        .iter()
        .find(|(keyword, _)| folded.contains(keyword))
        .map(|(_, field)| *field)
}

/// Visible text of a cell: tags dropped, entities decoded, whitespace collapsed.
fn cell_text(fragment: &str) -> String {
    let without_tags = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "nbsp" => ' ',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "aacute" => 'á',
        "eacute" => 'é',
        "iacute" => 'í',
        "oacute" => 'ó',
        "uacute" => 'ú',
        "Aacute" => 'Á',
        "Eacute" => 'É',
        "Iacute" => 'Í',
        "Oacute" => 'Ó',
        "Uacute" => 'Ú',
        "ntilde" => 'ñ',
        "Ntilde" => 'Ñ',
        "uuml" => 'ü',
        "Uuml" => 'Ü',
        "deg" => '°',
        "ordm" => 'º',
        _ => return None,
    };
    Some(c)
}

/// Lowercase and strip Spanish accents so "Dirección" and "DIRECCION" match.
fn fold(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rut() -> Rut {
        Rut::parse("76.086.428-5").unwrap()
    }

    const CUADRO_PAGE: &str = r#"
        <html><body>
        <table width="100%"><tr><td>Encabezado</td><td>SII</td></tr></table>
        <table class="cuadro" border=0>
          <tr><td><b>Nombre o Raz&oacute;n Social</b>:</td><td> COMERCIAL LOS ANDES SPA </td></tr>
          <TR><TD>Giro</TD><TD>VENTA AL POR MAYOR DE ALIMENTOS</TD></TR>
          <tr><td>Actividad Econ&oacute;mica</td><td>463020</td></tr>
          <tr><td>Direcci&oacute;n</td><td>AV. PROVIDENCIA&nbsp;1234</td></tr>
          <tr><td>Comuna</td><td>PROVIDENCIA</td></tr>
          <tr><td>Regi&oacute;n</td><td>METROPOLITANA</td></tr>
          <tr><td colspan="2">Fin</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_cuadro_table() {
        let now = Utc::now();
        let record = parse_taxpayer_page(CUADRO_PAGE, rut(), now).unwrap();

        assert_eq!(record.identifier, rut());
        assert_eq!(record.legal_name, "COMERCIAL LOS ANDES SPA");
        assert_eq!(record.business_activity.as_deref(), Some("VENTA AL POR MAYOR DE ALIMENTOS"));
        assert_eq!(record.economic_activity.as_deref(), Some("463020"));
        assert_eq!(record.address.as_deref(), Some("AV. PROVIDENCIA 1234"));
        assert_eq!(record.commune.as_deref(), Some("PROVIDENCIA"));
        assert_eq!(record.region.as_deref(), Some("METROPOLITANA"));
        assert_eq!(record.last_verified_at, now);
    }

    #[test]
    fn test_falls_back_to_first_table() {
        let html = r#"
            <table>
              <tr><th>RAZON SOCIAL</th><td>FERRETERIA EL SUR LTDA</td></tr>
              <tr><th>DOMICILIO</th><td>CALLE 1</td></tr>
            </table>
            <table><tr><td>Nombre</td><td>OTRA</td></tr></table>
        "#;

        let record = parse_taxpayer_page(html, rut(), Utc::now()).unwrap();
        assert_eq!(record.legal_name, "FERRETERIA EL SUR LTDA");
        assert_eq!(record.address.as_deref(), Some("CALLE 1"));
        assert!(record.business_activity.is_none());
    }

    #[test]
    fn test_not_found_pages() {
        let no_table = "<html><body>RUT no registrado</body></html>";
        assert!(parse_taxpayer_page(no_table, rut(), Utc::now()).is_none());

        let no_name = "<table><tr><td>Giro</td><td>COMERCIO</td></tr></table>";
        assert!(parse_taxpayer_page(no_name, rut(), Utc::now()).is_none());

        let empty_name = "<table><tr><td>Razón Social</td><td>  </td></tr></table>";
        assert!(parse_taxpayer_page(empty_name, rut(), Utc::now()).is_none());
    }

    #[test]
    fn test_unclosed_rows() {
        let html = "<table class='cuadro'><tr><td>Nombre</td><td>ACME SPA</td><tr><td>Comuna</td><td>NUNOA</td></table>";
        let record = parse_taxpayer_page(html, rut(), Utc::now()).unwrap();
        assert_eq!(record.legal_name, "ACME SPA");
        assert_eq!(record.commune.as_deref(), Some("NUNOA"));
    }

    #[test]
    fn test_label_classification() {
        assert_eq!(classify_label("Razón Social:"), Some(Field::LegalName));
        assert_eq!(classify_label("DIRECCION"), Some(Field::Address));
        assert_eq!(classify_label("Región"), Some(Field::Region));
        assert_eq!(classify_label("Fecha inicio"), None);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&Ntilde;u&ntilde;oa &#211; &#xE9; &bogus;"), "Ñuñoa Ó é &bogus;");
    }
}
