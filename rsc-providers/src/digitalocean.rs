use crate::{inventory, ComputeProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rsc_common::{Image, NewInstance, Region, Size, SshKey};
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://api.digitalocean.com/v2";
const PER_PAGE: &str = "200";

pub struct DigitalOceanProvider {
    client: Client,
    api_base: String,
    token: String,
}

impl DigitalOceanProvider {
    pub fn new(token: String) -> Result<Self> {
        Self::with_api_base(token, API_BASE.to_string())
    }

    pub fn with_api_base(token: String, api_base: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build DigitalOcean HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token))
                .context("DigitalOcean token is not a valid header value")?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    /// Send a request and fail on non-2xx with the response body attached.
    /// Returns None for 404 so lookups can distinguish "absent" from "broken".
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.api_base, path);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .headers(self.headers()?)
            .query(query);
        if let Some(body) = body {
            req = req.json(&body);
        }

        tracing::debug!("[DigitalOcean API] {} {}", method, url);
        let resp = req.send().await.with_context(|| format!("{} {} failed", method, url))?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::error!(
                "[DigitalOcean API] {} {} failed: status={}, response={}",
                method,
                url,
                status.as_u16(),
                text
            );
            return Err(anyhow::anyhow!(
                "DigitalOcean {} {} failed: status={} body={}",
                method,
                path,
                status.as_u16(),
                text
            ));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Some(Value::Null));
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        Ok(Some(serde_json::from_str(&text).with_context(|| {
            format!("DigitalOcean {} {} returned invalid JSON", method, path)
        })?))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send(Method::GET, path, query, None)
            .await?
            .ok_or_else(|| anyhow::anyhow!("DigitalOcean GET {} returned 404", path))
    }

    /// Walk `links.pages.next` until exhausted, collecting `key` arrays.
    async fn get_all_pages(&self, path: &str, key: &str, extra: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut page: u32 = 1;
        loop {
            let page_str = page.to_string();
            let mut query: Vec<(&str, &str)> = vec![("page", page_str.as_str()), ("per_page", PER_PAGE)];
            query.extend_from_slice(extra);

            let json_resp = self.get(path, &query).await?;
            let items = json_resp[key]
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("No '{}' array in response", key))?;
            out.extend(items.iter().cloned());

            if json_resp["links"]["pages"]["next"].as_str().is_none() || items.is_empty() {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

/// DigitalOcean ids are integers; everything else in the workspace uses strings.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn parse_droplet(d: &Value) -> Result<inventory::DiscoveredInstance> {
    let provider_id = id_string(&d["id"]).ok_or_else(|| anyhow::anyhow!("droplet without id"))?;
    let public_ip = d["networks"]["v4"].as_array().and_then(|nets| {
        nets.iter()
            .find(|n| n["type"].as_str() == Some("public"))
            .and_then(|n| n["ip_address"].as_str())
            .map(|s| s.to_string())
    });
    Ok(inventory::DiscoveredInstance {
        name: d["name"].as_str().unwrap_or_default().to_string(),
        region_id: d["region"]["slug"].as_str().unwrap_or_default().to_string(),
        image_id: id_string(&d["image"]["id"]).unwrap_or_default(),
        status: d["status"].as_str().unwrap_or("unknown").to_string(),
        // Older payloads carry a flat `ip_address`.
        ip_address: public_ip.or_else(|| d["ip_address"].as_str().map(|s| s.to_string())),
        provider_id,
    })
}

fn parse_image(i: &Value) -> Option<Image> {
    Some(Image {
        id: id_string(&i["id"])?,
        name: i["name"].as_str().unwrap_or_default().to_string(),
        regions: i["regions"]
            .as_array()
            .map(|rs| rs.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl ComputeProvider for DigitalOceanProvider {
    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>> {
        self.get_all_pages("/droplets", "droplets", &[])
            .await?
            .iter()
            .map(parse_droplet)
            .collect()
    }

    async fn find_instance(&self, instance_id: &str) -> Result<inventory::DiscoveredInstance> {
        let json_resp = self.get(&format!("/droplets/{}", instance_id), &[]).await?;
        parse_droplet(&json_resp["droplet"])
    }

    async fn create_instance(&self, request: &NewInstance) -> Result<inventory::DiscoveredInstance> {
        let body = json!({
            "name": request.name,
            "region": request.region_id,
            "size": request.size_id,
            "image": id_value(&request.image_id),
            "ssh_keys": request.ssh_key_ids.iter().map(|k| id_value(k)).collect::<Vec<_>>(),
        });
        tracing::info!(
            "[DigitalOcean API] Creating droplet: name={}, region={}, size={}, image={}",
            request.name,
            request.region_id,
            request.size_id,
            request.image_id
        );

        let json_resp = self
            .send(Method::POST, "/droplets", &[], Some(body))
            .await?
            .ok_or_else(|| anyhow::anyhow!("DigitalOcean create droplet returned 404"))?;
        let droplet = parse_droplet(&json_resp["droplet"])?;
        tracing::info!(
            "[DigitalOcean API] Droplet created: id={}, status={}",
            droplet.provider_id,
            droplet.status
        );
        Ok(droplet)
    }

    async fn destroy_instance(&self, instance_id: &str) -> Result<bool> {
        let resp = self
            .send(Method::DELETE, &format!("/droplets/{}", instance_id), &[], None)
            .await?;
        Ok(resp.is_some())
    }

    async fn power_cycle_instance(&self, instance_id: &str) -> Result<bool> {
        let resp = self
            .send(
                Method::POST,
                &format!("/droplets/{}/actions", instance_id),
                &[],
                Some(json!({ "type": "power_cycle" })),
            )
            .await?;
        Ok(resp.is_some())
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        Ok(self
            .get_all_pages("/images", "images", &[("private", "true")])
            .await?
            .iter()
            .filter_map(parse_image)
            .collect())
    }

    async fn find_image(&self, image_id: &str) -> Result<Option<Image>> {
        let resp = self
            .send(Method::GET, &format!("/images/{}", image_id), &[], None)
            .await?;
        Ok(resp.and_then(|v| parse_image(&v["image"])))
    }

    async fn destroy_image(&self, image_id: &str) -> Result<bool> {
        let resp = self
            .send(Method::DELETE, &format!("/images/{}", image_id), &[], None)
            .await?;
        Ok(resp.is_some())
    }

    async fn list_regions(&self) -> Result<Vec<Region>> {
        Ok(self
            .get_all_pages("/regions", "regions", &[])
            .await?
            .iter()
            .filter_map(|r| {
                let slug = r["slug"].as_str()?.to_string();
                Some(Region {
                    id: slug.clone(),
                    name: r["name"].as_str().unwrap_or(&slug).to_string(),
                    slug,
                })
            })
            .collect())
    }

    async fn list_sizes(&self) -> Result<Vec<Size>> {
        Ok(self
            .get_all_pages("/sizes", "sizes", &[])
            .await?
            .iter()
            .filter_map(|s| {
                let slug = s["slug"].as_str()?.to_string();
                Some(Size { id: slug.clone(), slug })
            })
            .collect())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        Ok(self
            .get_all_pages("/account/keys", "ssh_keys", &[])
            .await?
            .iter()
            .filter_map(|k| {
                Some(SshKey {
                    id: id_string(&k["id"])?,
                    name: k["name"].as_str().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }
}
