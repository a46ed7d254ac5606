use tracing::trace;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::der_parser::asn1_rs::{Any, FromDer, Tag, ToDer};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::x509::X509Name;

use crate::error::Error;
use crate::types::Result;

const PEM_TAG: &str = "CERTIFICATE REQUEST";

/// Attributes derived from the PKCS#10 payload of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Subject distinguished name in canonical string form
    pub subject: String,
    /// DNS names from the subjectAltName extension request
    pub dns_names: Vec<String>,
}

/// Parse a PEM-encoded PKCS#10 request
pub fn parse_request(pem_bytes: &[u8]) -> Result<ParsedRequest> {
    let block = pem::parse(pem_bytes)?;
    if block.tag() != PEM_TAG {
        return Err(Error::MalformedRequest(format!(
            "unexpected PEM block type \"{}\"",
            block.tag()
        )));
    }

    parse_request_der(block.contents())
}

/// Parse a DER-encoded PKCS#10 request
pub fn parse_request_der(der: &[u8]) -> Result<ParsedRequest> {
    let (rest, request) = X509CertificationRequest::from_der(der)
        .map_err(|e| Error::MalformedRequest(e.to_string()))?;
    if !rest.is_empty() {
        return Err(Error::MalformedRequest(format!(
            "{} trailing bytes after request",
            rest.len()
        )));
    }

    let subject = canonical_name(&request.certification_request_info.subject);

    let mut dns_names = Vec::new();
    if let Some(extensions) = request.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        dns_names.push(dns.to_string());
                    }
                }
            }
        }
    }

    trace!("Parsed request subject={} dns_names={:?}", subject, dns_names);
    Ok(ParsedRequest { subject, dns_names })
}

/// Subject attributes rendered by short name, in the order the RDN sequence
/// is built. `false` marks single-valued attributes where the last value wins.
const NAMED_ATTRIBUTES: [(&str, &str, bool); 9] = [
    ("2.5.4.6", "C", true),
    ("2.5.4.8", "ST", true),
    ("2.5.4.7", "L", true),
    ("2.5.4.9", "STREET", true),
    ("2.5.4.17", "POSTALCODE", true),
    ("2.5.4.10", "O", true),
    ("2.5.4.11", "OU", true),
    ("2.5.4.3", "CN", false),
    ("2.5.4.5", "SERIALNUMBER", false),
];

/// Render a subject in canonical string form.
///
/// Values of the named attribute types are regrouped by type into a fixed
/// sequence (country first, serial number last), with all values of one type
/// sharing an RDN. Any other attribute keeps its own RDN ahead of them and is
/// written as `<dotted oid>=#<hex DER>`. The sequence is rendered last RDN
/// first, RDNs joined by `,` and RDN members by `+`.
pub fn canonical_name(name: &X509Name<'_>) -> String {
    let mut rdns: Vec<Vec<String>> = Vec::new();
    let mut named: Vec<Vec<String>> = vec![Vec::new(); NAMED_ATTRIBUTES.len()];

    for attr in name.iter_attributes() {
        let oid = attr.attr_type().to_id_string();
        match NAMED_ATTRIBUTES.iter().position(|(id, _, _)| *id == oid) {
            Some(index) => {
                // Non-string values of named types are not rendered
                let value = match string_value(attr.attr_value()) {
                    Some(value) => value,
                    None => continue,
                };
                if NAMED_ATTRIBUTES[index].2 {
                    named[index].push(value);
                } else {
                    named[index] = vec![value];
                }
            }
            None => {
                let der = unnamed_value_der(attr.attr_value());
                rdns.push(vec![format!("{}={}", oid, hex_value(&der))]);
            }
        }
    }

    for ((_, short, multi), values) in NAMED_ATTRIBUTES.iter().zip(named) {
        if values.is_empty() || (!multi && values[0].is_empty()) {
            continue;
        }
        rdns.push(
            values
                .iter()
                .map(|value| format!("{}={}", short, escape_value(value)))
                .collect(),
        );
    }

    rdns.iter()
        .rev()
        .map(|rdn| rdn.join("+"))
        .collect::<Vec<_>>()
        .join(",")
}

fn string_value(value: &Any<'_>) -> Option<String> {
    match value.tag() {
        Tag::NumericString | Tag::PrintableString | Tag::Utf8String | Tag::Ia5String | Tag::T61String => {
            std::str::from_utf8(value.data).ok().map(str::to_string)
        }
        Tag::BmpString => {
            if value.data.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = value
                .data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}

/// DER of an attribute value without a short name. String values are
/// re-encoded as PrintableString when every character allows it and as
/// UTF8String otherwise; anything else keeps its encoding.
fn unnamed_value_der(value: &Any<'_>) -> Vec<u8> {
    match string_value(value) {
        Some(s) => {
            let tag = if s.bytes().all(is_printable) {
                Tag::PrintableString
            } else {
                Tag::Utf8String
            };
            der_tlv(tag.0 as u8, s.as_bytes())
        }
        None => value.to_der_vec().unwrap_or_else(|_| value.data.to_vec()),
    }
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b' ' | b'\'' | b'(' | b')' | b'+' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?')
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len.to_be_bytes().iter().copied().skip_while(|b| *b == 0).collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }
    out.extend_from_slice(content);
    out
}

fn escape_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut escaped = String::with_capacity(value.len());

    for (i, c) in chars.iter().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (*c == ' ' || *c == '#'))
            || (i == chars.len() - 1 && *c == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(*c);
    }

    escaped
}

fn hex_value(raw: &[u8]) -> String {
    let mut out = String::with_capacity(1 + raw.len() * 2);
    out.push('#');
    for byte in raw {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use rcgen::DnType;

    #[test]
    fn test_parse_subject_and_dns_names() {
        let request = simple_request_pem("web-1", &["web-1.example.com", "web.example.com"]);

        let parsed = parse_request(&request).unwrap();
        assert_eq!(parsed.subject, "CN=web-1");
        assert_eq!(parsed.dns_names, vec!["web-1.example.com", "web.example.com"]);
    }

    #[test]
    fn test_subject_renders_serial_number_to_country() {
        let request = request_pem(
            &[
                (DnType::CountryName, "US"),
                (DnType::OrganizationName, "system:nodes"),
                (DnType::CommonName, "system:node:worker-1"),
            ],
            &[],
        );

        let parsed = parse_request(&request).unwrap();
        assert_eq!(parsed.subject, "CN=system:node:worker-1,O=system:nodes,C=US");
        assert!(parsed.dns_names.is_empty());
    }

    #[test]
    fn test_subject_escaping() {
        assert_eq!(escape_value("a,b"), "a\\,b");
        assert_eq!(escape_value("#lead"), "\\#lead");
        assert_eq!(escape_value(" pad "), "\\ pad\\ ");
        assert_eq!(escape_value("x+y;z"), "x\\+y\\;z");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn test_hex_value() {
        assert_eq!(hex_value(&[0x0c, 0x02, 0xab]), "#0c02ab");
    }

    const OID_CN: &[u8] = &[0x55, 0x04, 0x03];
    const OID_O: &[u8] = &[0x55, 0x04, 0x0a];
    const OID_OU: &[u8] = &[0x55, 0x04, 0x0b];
    const OID_C: &[u8] = &[0x55, 0x04, 0x06];
    const OID_DC: &[u8] = &[0x09, 0x92, 0x26, 0x89, 0x93, 0xf2, 0x2c, 0x64, 0x01, 0x19];
    const OID_EMAIL: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x01];

    fn attribute(oid: &[u8], tag: u8, value: &str) -> Vec<u8> {
        der_tlv(0x30, &[der_tlv(0x06, oid), der_tlv(tag, value.as_bytes())].concat())
    }

    fn rdn(attributes: &[Vec<u8>]) -> Vec<u8> {
        der_tlv(0x31, &attributes.concat())
    }

    fn render(rdns: &[Vec<u8>]) -> String {
        let der = der_tlv(0x30, &rdns.concat());
        let (_, name) = X509Name::from_der(&der).unwrap();
        canonical_name(&name)
    }

    #[test]
    fn test_subject_order_ignores_encoding_order() {
        let request = request_pem(
            &[
                (DnType::CommonName, "web"),
                (DnType::OrganizationName, "Example"),
            ],
            &[],
        );

        assert_eq!(parse_request(&request).unwrap().subject, "CN=web,O=Example");
    }

    #[test]
    fn test_repeated_type_shares_one_rdn() {
        let subject = render(&[
            rdn(&[attribute(OID_C, 0x13, "US")]),
            rdn(&[attribute(OID_OU, 0x0c, "b")]),
            rdn(&[attribute(OID_CN, 0x0c, "x")]),
            rdn(&[attribute(OID_OU, 0x0c, "a")]),
        ]);

        assert_eq!(subject, "CN=x,OU=b+OU=a,C=US");
    }

    #[test]
    fn test_multi_valued_rdn_is_split_by_type() {
        let subject = render(&[rdn(&[
            attribute(OID_CN, 0x0c, "x"),
            attribute(OID_O, 0x0c, "y"),
        ])]);

        assert_eq!(subject, "CN=x,O=y");
    }

    #[test]
    fn test_last_common_name_wins() {
        let subject = render(&[
            rdn(&[attribute(OID_CN, 0x0c, "first")]),
            rdn(&[attribute(OID_CN, 0x0c, "second")]),
        ]);

        assert_eq!(subject, "CN=second");
    }

    #[test]
    fn test_unnamed_attributes_render_as_hex_der() {
        let subject = render(&[
            rdn(&[attribute(OID_DC, 0x16, "com")]),
            rdn(&[attribute(OID_DC, 0x16, "example")]),
            rdn(&[attribute(OID_CN, 0x0c, "x")]),
        ]);

        assert_eq!(
            subject,
            "CN=x,0.9.2342.19200300.100.1.25=#13076578616d706c65,0.9.2342.19200300.100.1.25=#1303636f6d"
        );
    }

    #[test]
    fn test_unnamed_non_printable_value_uses_utf8_tag() {
        let subject = render(&[rdn(&[attribute(OID_EMAIL, 0x16, "a@b")])]);

        assert_eq!(subject, "1.2.840.113549.1.9.1=#0c03614062");
    }

    #[test]
    fn test_der_tlv_long_length() {
        let encoded = der_tlv(0x04, &[0u8; 200]);
        assert_eq!(&encoded[..3], &[0x04, 0x81, 200]);
        assert_eq!(encoded.len(), 203);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_request(b"not a request"),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_pem_type() {
        let block = b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let err = parse_request(block).unwrap_err();
        assert!(err.to_string().contains("CERTIFICATE"));
    }

    #[test]
    fn test_rejects_new_certificate_request_label() {
        let request = String::from_utf8(simple_request_pem("legacy", &[])).unwrap();
        let relabelled = request.replace("CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST");

        assert!(matches!(
            parse_request(relabelled.as_bytes()),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_der() {
        let request = simple_request_pem("truncated", &[]);
        let block = pem::parse(&request).unwrap();
        let der = block.contents();

        assert!(parse_request_der(&der[..der.len() / 2]).is_err());
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let request = simple_request_pem("trailing", &[]);
        let block = pem::parse(&request).unwrap();
        let mut der = block.contents().to_vec();
        der.extend_from_slice(&[0, 0]);

        let err = parse_request_der(&der).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }
}
