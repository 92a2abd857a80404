use serde::{Deserialize, Serialize};

use crate::model::Error;

/// Snapshot of the Istio versions found on a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IstioStatus {
    pub client_version: String,
    pub target_version: String,
    pub pilot_version: String,
    pub data_plane_version: String,
}

#[derive(Debug, Default, Deserialize)]
struct IstioVersionOutput {
    #[serde(rename = "clientVersion", default)]
    client_version: Option<ClientVersion>,
    #[serde(rename = "meshVersion", default)]
    mesh_version: Option<Vec<MeshComponent>>,
    #[serde(rename = "dataPlaneVersion", default)]
    data_plane_version: Option<Vec<DataPlaneVersion>>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientVersion {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct MeshComponent {
    #[serde(rename = "Info", default)]
    info: Option<MeshInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct MeshInfo {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct DataPlaneVersion {
    #[serde(rename = "IstioVersion", default)]
    istio_version: String,
}

/// Maps the output of `istioctl version --output json` into an `IstioStatus`.
///
/// istioctl may print warnings before the JSON document, everything before the first `{` is dropped.
pub fn map_version_output(output: &[u8], target_version: &str) -> Result<IstioStatus, Error> {
    if output.is_empty() {
        return Err(Error::VersionOutput("the result of the version command is empty".to_owned()));
    }
    let start = output
        .iter()
        .position(|byte| *byte == b'{')
        .ok_or_else(|| Error::VersionOutput("the result of the version command contains no JSON document".to_owned()))?;

    let version: IstioVersionOutput = serde_json::from_slice(&output[start..])?;

    Ok(IstioStatus {
        client_version: version.client_version.map(|client| client.version).unwrap_or_default(),
        target_version: target_version.to_owned(),
        pilot_version: version
            .mesh_version
            .into_iter()
            .flatten()
            .next()
            .and_then(|component| component.info)
            .map(|info| info.version)
            .unwrap_or_default(),
        data_plane_version: version
            .data_plane_version
            .into_iter()
            .flatten()
            .next()
            .map(|data_plane| data_plane.istio_version)
            .unwrap_or_default(),
    })
}
