use super::excerpt;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared::*;

/// e-check gateway reached through its form-encoded `echeck.asmx` endpoints.
pub struct HttpAchGateway {
    base_url: String,
    client_id: String,
    api_password: String,
    http: reqwest::Client,
}

impl HttpAchGateway {
    pub fn new(base_url: &str, client_id: &str, api_password: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client_id: client_id.trim().to_string(),
            api_password: api_password.trim().to_string(),
            http,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.api_password.is_empty()
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        if !self.is_configured() {
            return Err(anyhow!("ACH gateway client id or API password missing"));
        }

        let mut form = vec![
            ("Client_ID", self.client_id.as_str()),
            ("ApiPassword", self.api_password.as_str()),
        ];
        form.extend_from_slice(params);
        form.push(("x_delim_data", ""));
        form.push(("x_delim_char", ""));

        let url = format!("{}/echeck.asmx/{method}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("{method} returned {status}: {}", excerpt(&body)));
        }

        quick_xml::de::from_str(&body).with_context(|| format!("malformed {method} response"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceResultXml {
    #[serde(rename = "PaymentResult", default)]
    payment_result: String,
    #[serde(rename = "PaymentResultDescription", default)]
    payment_result_description: String,
    #[serde(rename = "Invoice_ID", default)]
    invoice_id: String,
    #[serde(rename = "Check_ID", default)]
    check_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct CheckStatusXml {
    #[serde(rename = "Result", default)]
    result: String,
    #[serde(rename = "ResultDescription", default)]
    result_description: String,
    #[serde(rename = "Processed", default)]
    processed: String,
    #[serde(rename = "Rejected", default)]
    rejected: String,
    #[serde(rename = "Check_ID", default)]
    check_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceStatusXml {
    #[serde(rename = "Result", default)]
    result: String,
    #[serde(rename = "ResultDescription", default)]
    result_description: String,
    #[serde(rename = "PaymentResultDescription", default)]
    payment_result_description: String,
    #[serde(rename = "Invoice_ID", default)]
    invoice_id: String,
    #[serde(rename = "Check_ID", default)]
    check_id: String,
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn invoice_created(xml: InvoiceResultXml) -> Result<InvoiceCreated> {
    let invoice_id = non_empty(xml.invoice_id).ok_or_else(|| {
        anyhow!(
            "OneTimeInvoice returned no invoice id (PaymentResult={} {})",
            xml.payment_result,
            xml.payment_result_description
        )
    })?;
    Ok(InvoiceCreated {
        invoice_id,
        check_id: non_empty(xml.check_id),
    })
}

fn check_status(requested: &str, xml: CheckStatusXml) -> Result<CheckStatus> {
    if xml.result.trim() != "0" {
        return Err(anyhow!(
            "CheckStatus Result={} Description={}",
            xml.result,
            xml.result_description
        ));
    }
    Ok(CheckStatus {
        check_id: non_empty(xml.check_id).unwrap_or_else(|| requested.to_string()),
        processed: flag(&xml.processed),
        rejected: flag(&xml.rejected),
        description: non_empty(xml.result_description),
    })
}

fn invoice_status(requested: &str, xml: InvoiceStatusXml) -> InvoiceStatus {
    InvoiceStatus {
        invoice_id: non_empty(xml.invoice_id).unwrap_or_else(|| requested.to_string()),
        check_id: non_empty(xml.check_id),
        result: xml.result.trim().to_string(),
        description: non_empty(xml.result_description).or(non_empty(xml.payment_result_description)),
    }
}

#[async_trait]
impl AchGatewayClient for HttpAchGateway {
    async fn create_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceCreated> {
        let xml: InvoiceResultXml = self
            .call(
                "OneTimeInvoice",
                &[
                    ("CustomerName", invoice.customer_name.as_str()),
                    ("EmailAddress", invoice.email.as_str()),
                    ("ItemName", invoice.item_name.as_str()),
                    ("ItemDescription", invoice.item_description.as_str()),
                    ("Amount", invoice.amount.as_str()),
                    ("PaymentDate", invoice.payment_date.as_str()),
                ],
            )
            .await?;
        invoice_created(xml)
    }

    async fn check_status(&self, check_id: &str) -> Result<CheckStatus> {
        let xml: CheckStatusXml = self.call("CheckStatus", &[("Check_ID", check_id)]).await?;
        check_status(check_id, xml)
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus> {
        let xml: InvoiceStatusXml = self
            .call("InvoiceStatus", &[("Invoice_ID", invoice_id)])
            .await?;
        Ok(invoice_status(invoice_id, xml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoice_without_check_id() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<InvoiceResult xmlns="CheckProcessing">
  <PaymentResult>0</PaymentResult>
  <PaymentResultDescription>Invoice sent</PaymentResultDescription>
  <Invoice_ID>INV-1</Invoice_ID>
  <Check_ID></Check_ID>
</InvoiceResult>"#;
        let created = invoice_created(quick_xml::de::from_str(xml).unwrap()).unwrap();
        assert_eq!(created.invoice_id, "INV-1");
        assert_eq!(created.check_id, None);
    }

    #[test]
    fn invoice_without_id_is_an_error() {
        let xml = r#"<InvoiceResult><PaymentResult>12</PaymentResult><PaymentResultDescription>Bad email</PaymentResultDescription></InvoiceResult>"#;
        let err = invoice_created(quick_xml::de::from_str(xml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("Bad email"));
    }

    #[test]
    fn check_status_flags_compare_case_insensitively() {
        let xml = r#"<CheckStatusResult xmlns="CheckProcessing">
  <Result>0</Result>
  <ResultDescription>OK</ResultDescription>
  <Processed>True</Processed>
  <Rejected>false</Rejected>
  <Check_ID>CHK-9</Check_ID>
</CheckStatusResult>"#;
        let status = check_status("CHK-9", quick_xml::de::from_str(xml).unwrap()).unwrap();
        assert!(status.processed);
        assert!(!status.rejected);
        assert_eq!(status.check_id, "CHK-9");
    }

    #[test]
    fn nonzero_check_status_result_is_an_error() {
        let xml = r#"<CheckStatusResult><Result>3</Result><ResultDescription>Unknown check</ResultDescription></CheckStatusResult>"#;
        assert!(check_status("CHK-9", quick_xml::de::from_str(xml).unwrap()).is_err());
    }

    #[test]
    fn invoice_status_keeps_sentinel_check_id() {
        let xml = r#"<InvoiceResult><Result>0</Result><Invoice_ID>INV-1</Invoice_ID><Check_ID>0</Check_ID></InvoiceResult>"#;
        let status = invoice_status("INV-1", quick_xml::de::from_str(xml).unwrap());
        assert_eq!(status.check_id.as_deref(), Some("0"));
        assert_eq!(status.debit_check_id(), None);
    }
}
