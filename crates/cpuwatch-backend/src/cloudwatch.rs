use crate::error::{BackendError, Result};
use crate::{BackendConfig, Credentials, MetricsBackend};
use chrono::{DateTime, Utc};
use cpuwatch_common::types::{AlarmSpec, Datapoint, MetricIdentity, MetricQuery, Statistic};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "monitoring";
const TARGET_PREFIX: &str = "GraniteServiceVersion20100801";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// CloudWatch client speaking the AWS JSON 1.0 protocol.
pub struct CloudWatchBackend {
    name: String,
    region: String,
    url: String,
    host: String,
    credentials: Credentials,
    client: Client,
}

impl CloudWatchBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        if config.region.trim().is_empty() {
            return Err(BackendError::ConfigError("region is required".to_string()));
        }
        if config.credentials.access_key_id.is_empty()
            || config.credentials.secret_access_key.is_empty()
        {
            return Err(BackendError::ConfigError(
                "access_key_id and secret_access_key are required".to_string(),
            ));
        }

        let url = match &config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.amazonaws.com", SERVICE, config.region),
        };
        let host = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&url)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if host.is_empty() {
            return Err(BackendError::ConfigError(format!(
                "endpoint has no host: {url}"
            )));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            name: format!("cloudwatch:{}", config.region),
            region: config.region,
            url: format!("{url}/"),
            host,
            credentials: config.credentials,
            client,
        })
    }

    /// AWS Signature Version 4 `Authorization` header for a JSON POST to `/`.
    fn sign_v4(&self, target: &str, payload: &str, amz_date: &str) -> Result<String> {
        let date = &amz_date[..8];

        // Step 1: canonical request, headers sorted by lowercase name
        let mut canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-amz-date:{}\n",
            CONTENT_TYPE, self.host, amz_date
        );
        let mut signed_headers = String::from("content-type;host;x-amz-date");
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
            signed_headers.push_str(";x-amz-security-token");
        }
        canonical_headers.push_str(&format!("x-amz-target:{target}\n"));
        signed_headers.push_str(";x-amz-target");

        let hashed_payload = hex::encode(Sha256::digest(payload.as_bytes()));
        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, hashed_payload
        );

        // Step 2: string to sign
        let credential_scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        // Step 3: derive the signing key and sign
        let k_date = hmac_sha256(
            format!("AWS4{}", self.credentials.secret_access_key).as_bytes(),
            date.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        // Step 4: authorization header
        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        ))
    }

    async fn call_api(&self, action: &str, payload: &serde_json::Value) -> Result<serde_json::Value> {
        let body = payload.to_string();
        let target = format!("{TARGET_PREFIX}.{action}");
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = self.sign_v4(&target, &body, &amz_date)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &self.host)
            .header("X-Amz-Date", &amz_date)
            .header("X-Amz-Target", &target)
            .header("Authorization", authorization);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        tracing::debug!(backend = %self.name, action, "Calling CloudWatch API");
        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_error(&self.name, status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait::async_trait]
impl MetricsBackend for CloudWatchBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Datapoint>> {
        let payload = serde_json::json!({
            "Namespace": query.identity.namespace,
            "MetricName": query.identity.metric_name,
            "Dimensions": dimensions_json(&query.identity),
            "StartTime": query.start.timestamp(),
            "EndTime": query.end.timestamp(),
            "Period": query.period_seconds,
            "Statistics": [query.statistic.to_string()],
        });

        let response = self.call_api("GetMetricStatistics", &payload).await?;
        let decoded: GetMetricStatisticsResponse = serde_json::from_value(response)?;

        let mut points = decoded
            .datapoints
            .into_iter()
            .filter_map(|raw| raw.into_datapoint(query.statistic).transpose())
            .collect::<Result<Vec<_>>>()?;
        points.sort_by_key(|dp| dp.timestamp);
        Ok(points)
    }

    async fn put_metric_alarm(&self, spec: &AlarmSpec) -> Result<()> {
        spec.validate()?;

        let payload = serde_json::json!({
            "AlarmName": spec.name,
            "AlarmDescription": spec.description,
            "ActionsEnabled": spec.enabled,
            "AlarmActions": spec.action_refs,
            "MetricName": spec.identity.metric_name,
            "Namespace": spec.identity.namespace,
            "Statistic": spec.statistic.to_string(),
            "Dimensions": dimensions_json(&spec.identity),
            "Period": spec.period_seconds,
            "EvaluationPeriods": spec.evaluation_periods,
            "Threshold": spec.threshold,
            "ComparisonOperator": spec.comparator.to_string(),
        });

        self.call_api("PutMetricAlarm", &payload).await?;
        Ok(())
    }

    async fn delete_alarms(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let payload = serde_json::json!({ "AlarmNames": names });
        self.call_api("DeleteAlarms", &payload).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GetMetricStatisticsResponse {
    #[serde(rename = "Datapoints", default)]
    datapoints: Vec<RawDatapoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDatapoint {
    /// Epoch seconds.
    timestamp: f64,
    average: Option<f64>,
    sum: Option<f64>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    sample_count: Option<f64>,
}

impl RawDatapoint {
    /// `Ok(None)` when the requested statistic is absent from the point.
    fn into_datapoint(self, statistic: Statistic) -> Result<Option<Datapoint>> {
        let value = match statistic {
            Statistic::Average => self.average,
            Statistic::Sum => self.sum,
            Statistic::Minimum => self.minimum,
            Statistic::Maximum => self.maximum,
            Statistic::SampleCount => self.sample_count,
        };
        let Some(value) = value else {
            return Ok(None);
        };
        let timestamp = epoch_to_datetime(self.timestamp).ok_or_else(|| {
            BackendError::InvalidResponse(format!("timestamp out of range: {}", self.timestamp))
        })?;
        Ok(Some(Datapoint { timestamp, value }))
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn dimensions_json(identity: &MetricIdentity) -> serde_json::Value {
    serde_json::Value::Array(
        identity
            .dimensions
            .iter()
            .map(|d| serde_json::json!({ "Name": d.name, "Value": d.value }))
            .collect(),
    )
}

/// Maps a non-2xx response to the matching [`BackendError`].
fn classify_error(backend: &str, status: u16, body: &str) -> BackendError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("__type"))
        .and_then(|v| v.as_str())
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string());
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("Message")))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let Some(code) = code else {
        return match status {
            401 | 403 => BackendError::Unauthorized {
                backend: backend.to_string(),
                message: body.to_string(),
            },
            429 => BackendError::RateLimited {
                backend: backend.to_string(),
                message: body.to_string(),
            },
            _ => BackendError::HttpError {
                backend: backend.to_string(),
                status,
                body: body.to_string(),
            },
        };
    };

    if code.starts_with("Throttling") || status == 429 {
        return BackendError::RateLimited {
            backend: backend.to_string(),
            message,
        };
    }

    let auth_failure = matches!(
        code.as_str(),
        "InvalidClientTokenId" | "SignatureDoesNotMatch" | "IncompleteSignature" | "ExpiredToken"
    ) || code.starts_with("AccessDenied")
        || code.starts_with("UnrecognizedClient")
        || status == 401
        || status == 403;
    if auth_failure {
        return BackendError::Unauthorized {
            backend: backend.to_string(),
            message: format!("{code}: {message}"),
        };
    }

    BackendError::ApiResponseError {
        backend: backend.to_string(),
        code,
        message,
    }
}

/// HMAC-SHA256 helper function
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| BackendError::SigningError(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
